use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use taskflow_core::cli::GlobalCli;
use taskflow_core::commands;
use taskflow_core::config::Config;
use taskflow_core::persistence::STORAGE_KEY;
use taskflow_core::render::Renderer;
use taskflow_core::{ManualClock, MemoryStorage, PersistenceBridge, TaskStore};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 12, 8, 30, 0)
        .single()
        .expect("valid time")
}

struct Session {
    storage: MemoryStorage,
    clock: ManualClock,
}

impl Session {
    fn new() -> Self {
        Self {
            storage: MemoryStorage::new(),
            clock: ManualClock::new(t0()),
        }
    }

    /// Runs one invocation against a freshly opened store, like the binary.
    fn run(&self, args: &[&str]) -> anyhow::Result<String> {
        let argv = std::iter::once("taskflow").chain(args.iter().copied());
        let cli = GlobalCli::try_parse_from(argv)?;

        let mut store = TaskStore::open(
            PersistenceBridge::new(Box::new(self.storage.clone())),
            Box::new(self.clock.clone()),
        );
        let mut out = Vec::new();
        commands::dispatch(
            &mut store,
            &Config::default(),
            &Renderer::plain(),
            &mut out,
            cli.command.unwrap_or_default(),
        )?;
        Ok(String::from_utf8(out)?)
    }

    fn ids(&self) -> Vec<String> {
        let store = TaskStore::open(
            PersistenceBridge::new(Box::new(self.storage.clone())),
            Box::new(self.clock.clone()),
        );
        store
            .state()
            .tasks
            .iter()
            .map(|task| task.id.to_string())
            .collect()
    }
}

#[test]
fn add_list_toggle_and_clear() {
    let session = Session::new();
    let added = session
        .run(&["add", "Buy", "milk", "--category", "personal", "--tag", "errand"])
        .expect("add");
    assert!(added.starts_with("Created task "));
    session
        .run(&["add", "Finish report", "-p", "high", "--due", "yesterday"])
        .expect("add");

    let listing = session.run(&["list", "--filter", "overdue"]).expect("list");
    assert!(listing.contains("Finish report"));
    assert!(!listing.contains("Buy milk"));
    assert!(listing.contains("1 of 2 task(s), 0 completed"));

    let searched = session.run(&["list", "--search", "ERRAND"]).expect("search");
    assert!(searched.contains("Buy milk"));

    let milk = session.ids()[1].clone();
    let toggled = session.run(&["toggle", &milk[..8]]).expect("toggle by prefix");
    assert!(toggled.starts_with("Completed task"));

    let cleared = session.run(&["clear-completed"]).expect("clear");
    assert_eq!(cleared, "Removed 1 completed task(s).\n");
    assert_eq!(session.ids().len(), 1);
}

#[test]
fn move_uses_drag_reorder() {
    let session = Session::new();
    for text in ["one", "two", "three"] {
        session.run(&["add", text]).expect("add");
    }
    let before = session.ids();

    let moved = session
        .run(&["move", &before[2], "--onto", &before[0]])
        .expect("move");
    assert_eq!(moved, format!("Moved task {} to position 1.\n", &before[2][..8]));

    let after = session.ids();
    assert_eq!(after, vec![before[2].clone(), before[0].clone(), before[1].clone()]);
}

#[test]
fn theme_settings_and_errors() {
    let session = Session::new();
    assert_eq!(session.run(&["theme", "toggle"]).expect("toggle"), "Theme: dark\n");
    assert_eq!(session.run(&["theme"]).expect("show"), "Theme: dark\n");
    assert!(session.run(&["theme", "sepia"]).is_err());

    let settings = session
        .run(&["settings", "sound-effects=on", "compactMode=yes"])
        .expect("settings");
    assert!(settings.contains("soundEffects        on"));
    assert!(settings.contains("compactMode         on"));
    assert!(session.run(&["settings", "volume=11"]).is_err());

    assert!(session.run(&["add", "   "]).is_err());
    assert!(session.run(&["list", "--filter", "someday"]).is_err());
    assert!(session.run(&["delete", "nope"]).is_err());
    assert!(session.storage.get(STORAGE_KEY).is_some());
}

#[test]
fn export_then_import_round_trip() {
    let source = Session::new();
    source.run(&["add", "carry me", "--notes", "with notes"]).expect("add");
    let exported = source.run(&["export"]).expect("export");
    assert!(exported.contains("\"version\": \"1.0.0\""));

    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("backup.json");
    std::fs::write(&file, &exported).expect("write export");

    let target = Session::new();
    target.run(&["add", "discard me"]).expect("add");
    let imported = target
        .run(&["import", file.to_str().expect("utf8 path")])
        .expect("import");
    assert_eq!(imported, "Imported 1 task(s).\n");
    assert_eq!(target.ids(), source.ids());

    let csv = target.run(&["export", "--format", "csv"]).expect("csv");
    assert!(csv.starts_with("ID,Text,Completed,CreatedAt,Category,Priority,DueDate,Tags\n"));
    assert!(csv.contains("\"carry me\""));

    let written = target
        .run(&["export", "--output", temp.path().to_str().expect("utf8 path")])
        .expect("export to dir");
    assert!(written.contains("taskflow-backup-2026-10-12.json"));
}
