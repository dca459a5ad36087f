// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage-layout migrations
//!
//! Small, ordered, idempotent units that prepare a storage root before
//! any store opens it. Applied ids are recorded in `migrations.json` so
//! re-running is a no-op.

use crate::error::StorageError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One migration unit
pub struct Migration {
    pub id: &'static str,
    pub description: &'static str,
    pub apply: fn(&Path) -> Result<(), StorageError>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MigrationLedger {
    #[serde(default)]
    applied: Vec<AppliedMigration>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AppliedMigration {
    id: String,
    applied_at_utc_ms: i64,
}

fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            id: "0001-storage-layout",
            description: "create index, keyframe, and sync directories",
            apply: |root| {
                fs::create_dir_all(root.join("index"))?;
                fs::create_dir_all(root.join("keyframes"))?;
                fs::create_dir_all(root.join("sync").join("cursors"))?;
                fs::create_dir_all(root.join("sync").join("remotes"))?;
                Ok(())
            },
        },
        Migration {
            id: "0002-view-state",
            description: "create the document-view directory",
            apply: |root| {
                fs::create_dir_all(root.join("view"))?;
                Ok(())
            },
        },
    ]
}

/// Apply pending migrations under `root`, in order. Returns the ids
/// applied by this call.
pub fn migrate(root: &Path) -> Result<Vec<String>, StorageError> {
    fs::create_dir_all(root)?;
    let ledger_path = root.join("migrations.json");
    let mut ledger = if ledger_path.exists() {
        let json = fs::read_to_string(&ledger_path)?;
        serde_json::from_str(&json)?
    } else {
        MigrationLedger::default()
    };

    let mut applied_now = Vec::new();
    for migration in all_migrations() {
        if ledger.applied.iter().any(|a| a.id == migration.id) {
            continue;
        }
        tracing::info!(id = migration.id, "applying storage migration");
        (migration.apply)(root)?;
        ledger.applied.push(AppliedMigration {
            id: migration.id.to_string(),
            applied_at_utc_ms: Utc::now().timestamp_millis(),
        });
        applied_now.push(migration.id.to_string());
    }

    if !applied_now.is_empty() {
        let json = serde_json::to_string_pretty(&ledger)?;
        fs::write(&ledger_path, json)?;
    }
    Ok(applied_now)
}
