//! Discovery store and agent fixtures
//!
//! The store lives in a temporary directory that is removed when the
//! fixture is dropped.

use std::path::PathBuf;

use serde_json::{json, Value};
use tempfile::TempDir;

use vtable_dumper::data::OnTransactInfo;
use vtable_dumper::{Config, Database, ServiceStore};

pub const SERVICE: &str = "media.player";
pub const DEVICE: &str = "1A2B3C4D";

/// A temporary data directory with a discovery store and output root
pub struct TestStore {
    _dir: TempDir,
    pub root: PathBuf,
    pub db: Database,
    pub store: ServiceStore,
}

impl TestStore {
    /// An empty store
    pub fn empty() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let root = dir.path().to_path_buf();
        let db = Database::open(root.join("binder.db")).expect("failed to open store");
        let store = ServiceStore::new(db.connection());
        Self {
            _dir: dir,
            root,
            db,
            store,
        }
    }

    /// A store where `SERVICE` on `DEVICE` has its onTransact recorded
    pub fn discovered() -> Self {
        let fixture = Self::empty();
        fixture.add_discovered(SERVICE, DEVICE, None);
        fixture
    }

    pub fn add_discovered(&self, service: &str, owner: &str, real_device: Option<&str>) {
        self.store
            .upsert_service(service, owner, real_device)
            .expect("failed to insert service");
        self.store
            .upsert_on_transact(service, owner, &sample_on_transact())
            .expect("failed to insert onTransact");
    }

    /// A service row without onTransact information
    pub fn add_undiscovered(&self, service: &str, owner: &str) {
        self.store
            .upsert_service(service, owner, None)
            .expect("failed to insert service");
    }

    pub fn target_root(&self) -> PathBuf {
        self.root.join("targets")
    }

    /// Defaults pointed at this fixture, with short waits
    pub fn config(&self) -> Config {
        let mut config = Config::default()
            .with_database_path(self.db.path.clone())
            .with_target_root(self.target_root());
        config.timing.ready_poll_interval_ms = 100;
        config.timing.session_deadline_secs = 5;
        config.timing.capture_delay_ms = 200;
        config
    }
}

pub fn sample_on_transact() -> OnTransactInfo {
    OnTransactInfo {
        entry_addr: 0x7a3c_1000,
        bin: "/system/lib64/libmediaplayerservice.so".into(),
        bbinder_path: "/system/lib64/libbinder.so".into(),
        module: "libmediaplayerservice".into(),
    }
}

pub fn setup_done() -> Value {
    json!({"type": "setup_done"})
}

/// Two slots, as the agent reports them
pub fn vtable_payload() -> Value {
    json!({
        "0": {"offset": 16, "module": "libfoo.so"},
        "1": {"offset": 24, "module": "libfoo.so"}
    })
}
