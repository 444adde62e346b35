use super::handler::*;
use crate::core::merge_writer::{MergeProgressOperations, Result as MergeResult};
use crate::core::path_utils;
use crate::core::tokenizer_utils::WordCountTokenCounter;
use crate::core::{
    CatalogError, CoreFileSystemScanner, CoreMergeWriter, CorePreferencesStorage, LoadOutcome, MergeError,
    MergeOutcome, MergeRequest, MergeWriterOperations, MergerConfig, ProjectError,
    RefreshSelectionPolicy,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};

struct Env {
    dir: TempDir,
    root: PathBuf,
    config: MergerConfig,
}

impl Env {
    fn prefs_path(&self) -> PathBuf {
        self.dir.path().join("prefs.json")
    }

    fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }
}

/*
 * `proj` with a.txt (10 bytes) and sub/b.txt (5 bytes). `proj` doubles as the home
 * directory so a fresh default project opens there.
 */
fn env() -> Env {
    let dir = tempdir().unwrap();
    let root = path_utils::normalize_path(&dir.path().join("proj"));
    fs::create_dir_all(root.join("sub")).unwrap();
    File::create(root.join("a.txt"))
        .unwrap()
        .write_all(b"0123456789")
        .unwrap();
    File::create(root.join("sub/b.txt"))
        .unwrap()
        .write_all(b"abcde")
        .unwrap();
    let config = MergerConfig {
        home_dir_override: Some(root.clone()),
        preferences_path: Some(dir.path().join("prefs.json")),
        default_ignore_rules: Vec::new(),
        ..MergerConfig::default()
    };
    Env { dir, root, config }
}

fn logic_with_writer(env: &Env, writer: Arc<dyn MergeWriterOperations>) -> MergerAppLogic {
    MergerAppLogic::new(
        env.config.clone(),
        Arc::new(CoreFileSystemScanner::new()),
        Arc::new(CorePreferencesStorage::new(Some(env.prefs_path()))),
        Arc::new(WordCountTokenCounter::new()),
        writer,
    )
}

fn logic(env: &Env) -> MergerAppLogic {
    logic_with_writer(env, Arc::new(CoreMergeWriter::new()))
}

// Started logic with the output directory moved out of the tree.
fn started(env: &Env) -> MergerAppLogic {
    let mut app = logic(env);
    app.startup();
    app.change_output_directory(&env.out_dir()).unwrap();
    app
}

fn wait_for_merge(app: &mut MergerAppLogic) -> Result<MergeOutcome> {
    for _ in 0..2000 {
        if let Some(result) = app.poll_merge() {
            return result;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("merge did not finish in time");
}

#[test]
fn test_fresh_startup_uses_default_project_at_home() {
    let env = env();
    let mut app = logic(&env);

    let outcome = app.startup();

    assert_eq!(outcome, LoadOutcome::FreshDefault);
    assert!(app.is_tree_ready());
    assert_eq!(app.store().current_name(), "Default");
    assert_eq!(app.session().root_dir(), env.root.as_path());
    assert!(app.session().catalog().exists(&env.root.join("a.txt")));
    assert!(app.status_message().contains("Default"));
}

#[test]
fn test_startup_recovers_from_corrupt_preferences() {
    let env = env();
    fs::write(env.prefs_path(), "{ not json").unwrap();
    let mut app = logic(&env);

    let outcome = app.startup();

    assert!(matches!(outcome, LoadOutcome::Recovered { .. }));
    assert!(app.is_tree_ready());
    assert_eq!(app.store().project_names(), vec!["Default".to_string()]);
}

#[test]
fn test_selection_stats_after_selecting_everything() {
    let env = env();
    let mut app = started(&env);

    app.on_expand(&env.root.join("sub")).unwrap();
    assert!(app.on_toggle(&env.root).unwrap());
    let stats = app.selection_stats();

    assert_eq!(stats.selected_files, 2);
    assert_eq!(stats.total_size, 15);
    assert_eq!(stats.total_chars, 15);
    assert_eq!(stats.total_tokens, 2);
    assert!(stats.summary_line().contains("15 B"));
}

#[test]
fn test_project_selection_survives_restart() {
    let env = env();
    {
        let mut app = started(&env);
        app.create_project("Work").unwrap();
        app.on_expand(&env.root.join("sub")).unwrap();
        app.on_set_selected(&env.root.join("sub/b.txt"), true).unwrap();
        app.set_prompt_text("  Explain the code  ");
        app.on_closing().unwrap();
    }

    let mut app = logic(&env);
    let outcome = app.startup();

    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            project: "Work".to_string()
        }
    );
    assert_eq!(app.session().prompt_text(), "Explain the code");
    app.on_expand(&env.root.join("sub")).unwrap();
    assert_eq!(app.session().selected_file_paths(), vec![env.root.join("sub/b.txt")]);
    assert_eq!(
        app.store().project_names(),
        vec!["Default".to_string(), "Work".to_string()]
    );
}

#[test]
fn test_merge_with_empty_selection_writes_nothing() {
    let env = env();
    let mut app = started(&env);
    let output = env.out_dir().join("merged.txt");

    let result = app.merge_now(&output);

    assert!(matches!(
        result,
        Err(AppLogicError::Merge(MergeError::EmptySelection))
    ));
    assert!(!output.exists());
    assert!(matches!(
        app.start_merge(&output),
        Err(AppLogicError::Merge(MergeError::EmptySelection))
    ));
    assert!(!app.is_merge_running());
}

#[test]
fn test_merge_now_writes_numbered_lines_and_saves() {
    let env = env();
    fs::write(env.root.join("a.txt"), "line one\nline two  \n").unwrap();
    let mut app = started(&env);
    app.set_prompt_text("Review this");
    app.on_set_selected(&env.root.join("a.txt"), true).unwrap();
    let output = app.suggested_output_path();
    assert_eq!(output, env.out_dir().join("Default_merged.txt"));

    let outcome = app.merge_now(&output).unwrap();

    assert_eq!(
        outcome,
        MergeOutcome::Completed {
            files_written: 1,
            output_path: output.clone()
        }
    );
    let text = fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("GOAL:\nReview this\n"));
    assert!(text.contains("    1 line one\n"));
    assert!(text.contains("    2 line two\n"));
    assert!(text.contains("END OF MERGED FILE - 1 files"));

    let saved = fs::read_to_string(env.prefs_path()).unwrap();
    assert!(saved.contains("a.txt"));
}

#[test]
fn test_background_merge_completes_through_polling() {
    let env = env();
    let mut app = started(&env);
    app.on_expand(&env.root.join("sub")).unwrap();
    app.on_toggle(&env.root).unwrap();
    let output = env.out_dir().join("all.txt");

    app.start_merge(&output).unwrap();
    assert!(app.is_merge_running());
    let outcome = wait_for_merge(&mut app).unwrap();

    assert!(matches!(outcome, MergeOutcome::Completed { files_written: 2, .. }));
    assert!(!app.is_merge_running());
    assert!(app.last_merge_progress().is_some_and(|p| p.finished));
    assert!(app.status_message().starts_with("Files merged successfully"));
    assert!(output.exists());
}

/*
 * Writer that holds the merge open until released and then reports cancellation when
 * it was requested.
 */
struct GatedWriter {
    gate: Arc<(Mutex<bool>, Condvar)>,
}

impl GatedWriter {
    fn release(gate: &Arc<(Mutex<bool>, Condvar)>) {
        let (lock, cvar) = &**gate;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }
}

impl MergeWriterOperations for GatedWriter {
    fn merge(
        &self,
        request: &MergeRequest,
        progress: &dyn MergeProgressOperations,
    ) -> MergeResult<MergeOutcome> {
        let (lock, cvar) = &*self.gate;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
        if progress.is_cancelled() {
            return Ok(MergeOutcome::Cancelled {
                files_written: 0,
                output_path: request.output_path.clone(),
            });
        }
        progress.finish(request.files.len());
        Ok(MergeOutcome::Completed {
            files_written: request.files.len(),
            output_path: request.output_path.clone(),
        })
    }
}

#[test]
fn test_second_merge_is_refused_while_one_runs() {
    let env = env();
    let gate = Arc::new((Mutex::new(false), Condvar::new()));
    let mut app = logic_with_writer(&env, Arc::new(GatedWriter { gate: gate.clone() }));
    app.startup();
    app.on_set_selected(&env.root.join("a.txt"), true).unwrap();
    let output = env.out_dir().join("merged.txt");

    app.start_merge(&output).unwrap();
    assert!(matches!(
        app.start_merge(&output),
        Err(AppLogicError::MergeInProgress)
    ));
    assert!(matches!(
        app.merge_now(&output),
        Err(AppLogicError::MergeInProgress)
    ));
    assert!(app.poll_merge().is_none());

    assert!(app.cancel_merge());
    GatedWriter::release(&gate);
    let outcome = wait_for_merge(&mut app).unwrap();

    assert!(matches!(outcome, MergeOutcome::Cancelled { .. }));
    assert_eq!(app.status_message(), "Merge cancelled by user.");
    assert!(!app.cancel_merge());
}

#[test]
fn test_rename_to_existing_name_is_rejected() {
    let env = env();
    let mut app = started(&env);
    app.create_project("Work").unwrap();

    let result = app.rename_project("Work", " Default ");

    assert!(matches!(
        result,
        Err(AppLogicError::Project(ProjectError::DuplicateName(_)))
    ));
    assert_eq!(
        app.store().project_names(),
        vec!["Default".to_string(), "Work".to_string()]
    );
    app.rename_project("Work", "  Client  ").unwrap();
    assert_eq!(app.store().current_name(), "Client");
}

#[test]
fn test_last_project_cannot_be_deleted() {
    let env = env();
    let mut app = started(&env);

    assert!(matches!(
        app.delete_project("Default"),
        Err(AppLogicError::Project(ProjectError::LastProject(_)))
    ));

    app.clone_project("Copy").unwrap();
    app.delete_project("Copy").unwrap();
    assert_eq!(app.store().current_name(), "Default");
    assert_eq!(app.store().len(), 1);
}

#[test]
fn test_change_root_clears_selection_and_persists() {
    let env = env();
    let mut app = started(&env);
    app.on_set_selected(&env.root.join("a.txt"), true).unwrap();

    let used = app.change_root_directory(&env.root.join("sub")).unwrap();

    assert_eq!(used, env.root.join("sub"));
    assert!(app.session().selected_file_paths().is_empty());
    assert_eq!(
        app.store().current_project().unwrap().root_dir,
        env.root.join("sub")
    );
}

#[test]
fn test_change_root_to_invalid_path_changes_nothing() {
    let env = env();
    let mut app = started(&env);
    app.on_expand(&env.root.join("sub")).unwrap();
    app.on_set_selected(&env.root.join("sub/b.txt"), true).unwrap();
    app.save_preferences().unwrap();
    let saved_before = fs::read_to_string(env.prefs_path()).unwrap();

    let missing = app.change_root_directory(&env.dir.path().join("tpyo"));
    let not_dir = app.change_root_directory(&env.root.join("a.txt"));

    assert!(matches!(
        missing,
        Err(AppLogicError::Catalog(CatalogError::NotFound(_)))
    ));
    assert!(matches!(
        not_dir,
        Err(AppLogicError::Catalog(CatalogError::NotADirectory(_)))
    ));
    assert_eq!(app.session().root_dir(), env.root.as_path());
    assert_eq!(
        app.session().selected_file_paths(),
        vec![env.root.join("sub/b.txt")]
    );
    assert_eq!(fs::read_to_string(env.prefs_path()).unwrap(), saved_before);
}

#[test]
fn test_deselected_restored_paths_stay_deselected_after_expand() {
    let env = env();
    {
        let mut app = started(&env);
        app.on_expand(&env.root.join("sub")).unwrap();
        app.on_set_selected(&env.root.join("sub/b.txt"), true).unwrap();
        app.on_closing().unwrap();
    }

    // Restored with `sub` collapsed: b.txt is only remembered, not yet in the tree.
    let mut app = logic(&env);
    app.startup();
    app.save_preferences().unwrap();
    assert!(fs::read_to_string(env.prefs_path()).unwrap().contains("sub/b.txt"));

    assert_eq!(app.deselect_all(), 0);
    app.on_expand(&env.root.join("sub")).unwrap();
    assert!(app.session().selected_file_paths().is_empty());
    app.save_preferences().unwrap();
    assert!(!fs::read_to_string(env.prefs_path()).unwrap().contains("sub/b.txt"));
}

#[test]
fn test_deselecting_collapsed_dir_drops_restored_children() {
    let env = env();
    {
        let mut app = started(&env);
        app.on_expand(&env.root.join("sub")).unwrap();
        app.on_set_selected(&env.root.join("sub/b.txt"), true).unwrap();
        app.on_set_selected(&env.root.join("a.txt"), true).unwrap();
        app.on_closing().unwrap();
    }

    let mut app = logic(&env);
    app.startup();
    assert!(app.on_set_selected(&env.root.join("sub"), false).unwrap());
    app.on_expand(&env.root.join("sub")).unwrap();

    assert_eq!(app.session().selected_file_paths(), vec![env.root.join("a.txt")]);
}

#[test]
fn test_output_directory_is_stored_normalized() {
    let env = env();
    let mut app = started(&env);
    let requested = env.dir.path().join("proj").join("..").join("merged_out");

    let used = app.change_output_directory(&requested).unwrap();

    let expected = path_utils::normalize_path(&env.dir.path().join("merged_out"));
    assert_eq!(used, expected);
    assert!(expected.is_dir());
    assert_eq!(app.session().output_dir(), expected.as_path());
    assert_eq!(app.store().current_project().unwrap().output_dir, expected);
}

#[test]
fn test_ignore_rules_hide_entries_and_keep_selection() {
    let env = env();
    let mut app = started(&env);
    app.on_set_selected(&env.root.join("a.txt"), true).unwrap();

    app.edit_ignore_rules(&["sub".to_string()]).unwrap();

    assert!(!app.session().catalog().exists(&env.root.join("sub")));
    assert_eq!(app.session().selected_file_paths(), vec![env.root.join("a.txt")]);
    assert_eq!(
        app.store().current_project().unwrap().ignored_file_types,
        vec!["sub".to_string()]
    );
}

#[test]
fn test_apply_default_rules_copies_text() {
    let env = env();
    let mut app = started(&env);
    app.set_default_rules_text("Be concise.");
    app.set_project_rules_text("old rules");

    app.apply_default_rules().unwrap();

    assert_eq!(app.session().project_rules_text(), "Be concise.");
    assert_eq!(
        app.store().current_project().unwrap().effective_project_rules(),
        "Be concise."
    );
}

#[test]
fn test_refresh_with_auto_select_picks_up_new_files() {
    let mut env = env();
    env.config.refresh_policy = RefreshSelectionPolicy::AutoSelectNew;
    let mut app = started(&env);
    app.on_set_selected(&env.root.join("a.txt"), true).unwrap();
    fs::write(env.root.join("c.txt"), "new").unwrap();

    let summary = app.refresh_directory().unwrap();

    assert_eq!(summary.added, 1);
    assert!(app.session().selection().is_selected(&env.root.join("c.txt")));
    assert!(app.session().selection().is_selected(&env.root.join("a.txt")));
}

#[test]
fn test_project_info_counts_loaded_files() {
    let env = env();
    let mut app = started(&env);
    app.on_set_selected(&env.root.join("a.txt"), true).unwrap();

    let info = app.project_info().unwrap();

    assert_eq!(info.name, "Default");
    assert_eq!(info.total_files, 1);
    assert_eq!(info.extensions.len(), 1);
    assert_eq!(info.extensions[0].extension, ".txt");
}
