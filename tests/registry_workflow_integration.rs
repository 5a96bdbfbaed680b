//! End-to-end decide and apply runs over temporary configuration trees.

use etc_proposals::application::{ChangeFilter, Registry, Session};
use etc_proposals::domain::{Decision, DecisionAction, OpcodeKind};
use etc_proposals::infra::app_config::AppConfig;
use etc_proposals::infra::db::Database;
use etc_proposals::infra::oracle::StaticOracle;
use std::fs;
use std::path::Path;

fn open(root: &Path, config: AppConfig) -> Registry {
    let session = Session::new(
        config,
        Database::open_in_memory().expect("db"),
        Box::new(StaticOracle::new(vec![root.to_path_buf()])),
    );
    Registry::open(session).expect("registry")
}

fn decide_all(registry: &mut Registry, action: DecisionAction) -> anyhow::Result<usize> {
    let ids = registry.change_ids(&ChangeFilter::All)?;
    registry.decide(&ids, action)
}

#[test]
fn test_replace_one_line_and_apply() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let live = dir.path().join("hosts");
    fs::write(&live, "A\nB\nC\n")?;
    fs::write(dir.path().join("._cfg0000_hosts"), "A\nX\nC\n")?;
    let mut registry = open(dir.path(), AppConfig::default());

    {
        let changes = registry.changes(&ChangeFilter::All)?;
        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.kind(), OpcodeKind::Replace);
        assert_eq!(change.baseline_lines(), ["B\n".to_string()]);
        assert_eq!(change.proposed_lines(), ["X\n".to_string()]);
        assert_eq!(change.status(), Decision::Undecided);
    }

    decide_all(&mut registry, DecisionAction::Use)?;
    let report = registry.apply_all()?;

    assert_eq!(report.applied, vec![dir.path().join("._cfg0000_hosts")]);
    assert_eq!(fs::read_to_string(&live)?, "A\nX\nC\n");
    assert!(!dir.path().join("._cfg0000_hosts").exists());
    assert!(!dir.path().join("hosts.bak").exists());
    Ok(())
}

#[test]
fn test_all_use_yields_proposed_bytes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let live = dir.path().join("make.conf");
    fs::write(&live, "CFLAGS=\"-O2\"\nUSE=\"x\"\n# end")?;
    let proposed = "# new header\r\nCFLAGS=\"-O2 -pipe\"\nUSE=\"x\"\n";
    fs::write(dir.path().join("._cfg0000_make.conf"), proposed)?;
    let mut registry = open(dir.path(), AppConfig::default());

    decide_all(&mut registry, DecisionAction::Use)?;
    registry.apply_all()?;
    assert_eq!(fs::read_to_string(&live)?, proposed);
    Ok(())
}

#[test]
fn test_all_zap_keeps_baseline_bytes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let live = dir.path().join("fstab");
    let baseline = "/dev/sda1 / ext4 defaults 0 1\n\n# no final newline";
    fs::write(&live, baseline)?;
    fs::write(
        dir.path().join("._cfg0000_fstab"),
        "# /etc/fstab\n/dev/sda1 / ext4 noatime 0 1\n",
    )?;
    let mut registry = open(dir.path(), AppConfig::default());

    decide_all(&mut registry, DecisionAction::Zap)?;
    let report = registry.apply_all()?;
    assert_eq!(report.applied.len(), 1);
    assert_eq!(fs::read_to_string(&live)?, baseline);
    Ok(())
}

#[test]
fn test_apply_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let live = dir.path().join("a");
    fs::write(&live, "1\n")?;
    fs::write(dir.path().join("._cfg0000_a"), "2\n")?;
    let mut registry = open(dir.path(), AppConfig::default());

    decide_all(&mut registry, DecisionAction::Use)?;
    assert_eq!(registry.apply_all()?.applied.len(), 1);

    let again = registry.apply_all()?;
    assert!(again.applied.is_empty());
    assert!(again.failed.is_empty());
    assert_eq!(fs::read_to_string(&live)?, "2\n");
    Ok(())
}

#[test]
fn test_second_revision_builds_on_first() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let live = dir.path().join("app.conf");
    fs::write(&live, "a\nb\nc\n")?;
    fs::write(dir.path().join("._cfg0000_app.conf"), "a\nB\nc\n")?;
    fs::write(dir.path().join("._cfg0001_app.conf"), "a\nB\nc\nd\n")?;
    let mut registry = open(dir.path(), AppConfig::default());

    // zap r0, so r1 still proposes both the B and the d line
    let r0 = registry.change_ids(&ChangeFilter::Proposal(dir.path().join("._cfg0000_app.conf")))?;
    registry.decide(&r0, DecisionAction::Zap)?;
    let r1 = registry.change_ids(&ChangeFilter::Proposal(dir.path().join("._cfg0001_app.conf")))?;
    assert_eq!(r1.len(), 2);
    let inserts: Vec<_> = r1
        .iter()
        .filter(|id| id.opcode.kind == OpcodeKind::Insert)
        .cloned()
        .collect();
    registry.decide(&inserts, DecisionAction::Use)?;
    registry.decide_matching(
        &[ChangeFilter::Proposal(dir.path().join("._cfg0001_app.conf"))],
        DecisionAction::Zap,
    )?;

    let report = registry.apply_all()?;
    assert_eq!(report.applied.len(), 2);
    assert_eq!(fs::read_to_string(&live)?, "a\nb\nc\nd\n");
    assert!(registry.files().is_empty());
    Ok(())
}

#[test]
fn test_missing_live_file_is_created() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let artifact = dir.path().join("._cfg0000_new.conf");
    fs::write(&artifact, "fresh\nfile\n")?;
    let mut registry = open(dir.path(), AppConfig::default());

    {
        let changes = registry.changes(&ChangeFilter::All)?;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind(), OpcodeKind::Insert);
        assert!(changes[0].baseline_lines().is_empty());
    }

    decide_all(&mut registry, DecisionAction::Use)?;
    registry.apply_all()?;
    assert_eq!(fs::read_to_string(dir.path().join("new.conf"))?, "fresh\nfile\n");
    Ok(())
}

#[test]
fn test_pathological_diff_collapses() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("a"), "1\n2\n3\n4\n5\n6\n7\n")?;
    fs::write(dir.path().join("._cfg0000_a"), "x\n2\ny\n4\nz\n6\nw\n")?;
    let config = AppConfig {
        max_opcodes: 3,
        ..AppConfig::default()
    };
    let mut registry = open(dir.path(), config);

    let changes = registry.changes(&ChangeFilter::All)?;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind(), OpcodeKind::Replace);
    assert_eq!(changes[0].baseline_lines().len(), 7);
    assert_eq!(changes[0].proposed_lines().len(), 7);
    Ok(())
}

#[test]
fn test_collapse_disabled_with_zero() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("a"), "1\n2\n3\n4\n5\n6\n7\n")?;
    fs::write(dir.path().join("._cfg0000_a"), "x\n2\ny\n4\nz\n6\nw\n")?;
    let config = AppConfig {
        max_opcodes: 0,
        ..AppConfig::default()
    };
    let mut registry = open(dir.path(), config);

    assert_eq!(registry.change_ids(&ChangeFilter::All)?.len(), 4);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_apply_preserves_mode() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let live = dir.path().join("shadow.conf");
    fs::write(&live, "secret=1\n")?;
    fs::set_permissions(&live, fs::Permissions::from_mode(0o640))?;
    fs::write(dir.path().join("._cfg0000_shadow.conf"), "secret=2\n")?;
    let mut registry = open(dir.path(), AppConfig::default());

    decide_all(&mut registry, DecisionAction::Use)?;
    registry.apply_all()?;

    let mode = fs::metadata(&live)?.permissions().mode() & 0o777;
    assert_eq!(mode, 0o640);
    assert_eq!(fs::read_to_string(&live)?, "secret=2\n");
    Ok(())
}

#[test]
fn test_hidden_directories_are_scanned() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let hidden = dir.path().join(".config");
    fs::create_dir(&hidden)?;
    fs::write(hidden.join("rc"), "a\n")?;
    fs::write(hidden.join("._cfg0000_rc"), "b\n")?;
    fs::write(dir.path().join("._cfg00_broken"), "not a proposal\n")?;
    let registry = open(dir.path(), AppConfig::default());

    assert_eq!(registry.files(), vec![hidden.join("rc")]);
    Ok(())
}
