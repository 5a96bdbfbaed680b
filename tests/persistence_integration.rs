//! Decisions surviving a restart, and what happens when they no longer fit.

use etc_proposals::application::{ChangeFilter, Registry, Session};
use etc_proposals::domain::{Decision, DecisionAction};
use etc_proposals::infra::app_config::AppConfig;
use etc_proposals::infra::db::Database;
use etc_proposals::infra::oracle::StaticOracle;
use std::fs;
use std::path::Path;

fn open(root: &Path, db_path: &Path) -> anyhow::Result<Registry> {
    let config = AppConfig {
        state_path: Some(db_path.to_path_buf()),
        ..AppConfig::default()
    };
    let session = Session::new(
        config,
        Database::open_at(db_path.to_path_buf())?,
        Box::new(StaticOracle::new(vec![root.to_path_buf()])),
    );
    Registry::open(session)
}

fn statuses(registry: &mut Registry) -> anyhow::Result<Vec<Decision>> {
    Ok(registry
        .changes(&ChangeFilter::All)?
        .iter()
        .map(|c| c.status())
        .collect())
}

#[test]
fn test_decisions_survive_restart() -> anyhow::Result<()> {
    let etc = tempfile::tempdir().expect("tempdir");
    let state = tempfile::tempdir().expect("tempdir");
    let db_path = state.path().join("state.sqlite");
    fs::write(etc.path().join("a"), "1\n2\n3\n4\n5\n")?;
    fs::write(etc.path().join("._cfg0000_a"), "1\nx\n3\n4\ny\n")?;

    {
        let mut registry = open(etc.path(), &db_path)?;
        let ids = registry.change_ids(&ChangeFilter::All)?;
        assert_eq!(ids.len(), 2);
        registry.decide(&ids[..1], DecisionAction::Use)?;
        registry.decide(&ids[1..], DecisionAction::Zap)?;
    }

    let mut registry = open(etc.path(), &db_path)?;
    assert_eq!(statuses(&mut registry)?, vec![Decision::Use, Decision::Zap]);
    assert!(registry.is_finished(&etc.path().join("._cfg0000_a"))?);

    registry.apply_all()?;
    assert_eq!(fs::read_to_string(etc.path().join("a"))?, "1\nx\n3\n4\n5\n");
    Ok(())
}

#[test]
fn test_undo_is_persisted() -> anyhow::Result<()> {
    let etc = tempfile::tempdir().expect("tempdir");
    let state = tempfile::tempdir().expect("tempdir");
    let db_path = state.path().join("state.sqlite");
    fs::write(etc.path().join("a"), "1\n")?;
    fs::write(etc.path().join("._cfg0000_a"), "2\n")?;

    {
        let mut registry = open(etc.path(), &db_path)?;
        let ids = registry.change_ids(&ChangeFilter::All)?;
        registry.decide(&ids, DecisionAction::Use)?;
        registry.decide(&ids, DecisionAction::Undo)?;
    }

    let mut registry = open(etc.path(), &db_path)?;
    assert_eq!(statuses(&mut registry)?, vec![Decision::Undecided]);
    Ok(())
}

#[test]
fn test_shifted_diff_drops_later_decisions() -> anyhow::Result<()> {
    let etc = tempfile::tempdir().expect("tempdir");
    let state = tempfile::tempdir().expect("tempdir");
    let db_path = state.path().join("state.sqlite");
    let live = etc.path().join("a");
    fs::write(&live, "1\n2\n3\n4\n5\n")?;
    fs::write(etc.path().join("._cfg0000_a"), "1\nx\n3\n4\ny\n")?;

    {
        let mut registry = open(etc.path(), &db_path)?;
        let ids = registry.change_ids(&ChangeFilter::All)?;
        registry.decide(&ids, DecisionAction::Use)?;
    }

    // an edit to the tail of the live file moves the second change only
    fs::write(&live, "1\n2\n3\n4\n5\n6\n")?;
    let mut registry = open(etc.path(), &db_path)?;
    let after = statuses(&mut registry)?;
    assert_eq!(after[0], Decision::Use);
    assert!(after[1..].iter().all(|s| *s == Decision::Undecided));
    Ok(())
}

#[test]
fn test_corrupt_entry_is_discarded() -> anyhow::Result<()> {
    let etc = tempfile::tempdir().expect("tempdir");
    let state = tempfile::tempdir().expect("tempdir");
    let db_path = state.path().join("state.sqlite");
    fs::write(etc.path().join("a"), "1\n")?;
    fs::write(etc.path().join("._cfg0000_a"), "2\n")?;
    fs::write(etc.path().join("b"), "1\n")?;
    fs::write(etc.path().join("._cfg0000_b"), "2\n")?;

    {
        let mut registry = open(etc.path(), &db_path)?;
        let ids = registry.change_ids(&ChangeFilter::All)?;
        registry.decide(&ids, DecisionAction::Zap)?;
    }
    {
        let db = Database::open_at(db_path.clone())?;
        let conn = db.connection();
        let guard = conn.lock().unwrap();
        guard.execute(
            "UPDATE proposal_decisions SET entries_json = '[{\"opcode\":' WHERE artifact_path = ?1",
            [etc.path().join("._cfg0000_a").to_string_lossy().to_string()],
        )?;
    }

    let mut registry = open(etc.path(), &db_path)?;
    assert_eq!(
        statuses(&mut registry)?,
        vec![Decision::Undecided, Decision::Zap]
    );
    Ok(())
}

#[test]
fn test_gc_after_apply_prunes_stale_entries() -> anyhow::Result<()> {
    let etc = tempfile::tempdir().expect("tempdir");
    let state = tempfile::tempdir().expect("tempdir");
    let db_path = state.path().join("state.sqlite");
    fs::write(etc.path().join("a"), "1\n")?;
    fs::write(etc.path().join("._cfg0000_a"), "2\n")?;

    let mut registry = open(etc.path(), &db_path)?;
    // left behind by a proposal another tool already merged
    registry
        .session()
        .db()
        .decision_repo()
        .save(&etc.path().join("._cfg0001_gone"), &[])?;
    let ids = registry.change_ids(&ChangeFilter::All)?;
    registry.decide(&ids, DecisionAction::Zap)?;

    let report = registry.apply_all()?;
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.pruned.decisions, 1);
    assert!(registry.session().db().decision_repo().keys()?.is_empty());
    Ok(())
}
