// src/repository/sqlite.rs

//! SQLite-backed package store
//!
//! One database file holds one store: a repository or the installed set.
//! The schema mirrors [`PackageRecord`] with one child table per list field.

use super::{
    Dependency, DependencyKind, LinkedLibrary, PackageId, PackageRecord, PackageStore,
    RepositoryId,
};
use crate::atom::Specifier;
use crate::error::{Error, Result};
use crate::hash::Hasher;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);

    Ok(version)
}

/// Bring the schema up to date
fn migrate(conn: &Connection) -> Result<()> {
    let current = get_schema_version(conn)?;
    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=SCHEMA_VERSION {
        debug!("Applying store schema version {}", version);
        if version == 1 {
            migrate_v1(conn)?;
        }
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }

    info!("Store schema at version {}", SCHEMA_VERSION);
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Identity of the store; name is NULL for the installed set
        CREATE TABLE store_info (
            id INTEGER PRIMARY KEY CHECK(id = 1),
            name TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            local INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            slot TEXT NOT NULL DEFAULT '0',
            version TEXT NOT NULL,
            tag TEXT,
            revision INTEGER NOT NULL DEFAULT 0,
            branch TEXT NOT NULL DEFAULT 'main',
            system INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX idx_packages_key ON packages(key, slot);

        CREATE TABLE dependencies (
            package_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            spec TEXT NOT NULL,
            dep_key TEXT NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('runtime', 'optional')),
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_dependencies_key ON dependencies(dep_key);

        CREATE TABLE conflicts (
            package_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            spec TEXT NOT NULL,
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE TABLE provides (
            package_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            virtual_key TEXT NOT NULL,
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_provides_key ON provides(virtual_key);

        CREATE TABLE libraries (
            package_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            soname TEXT NOT NULL,
            elfclass INTEGER NOT NULL,
            direction TEXT NOT NULL CHECK(direction IN ('needed', 'provided')),
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_libraries_soname ON libraries(soname, elfclass, direction);

        CREATE TABLE labels (
            package_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            value TEXT NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('license', 'keyword')),
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );
        ",
    )?;
    Ok(())
}

/// A package store persisted in SQLite
pub struct SqliteStore {
    conn: Connection,
    id: RepositoryId,
    priority: i32,
    local: bool,
}

impl SqliteStore {
    /// Create (or reinitialize the identity of) a store at `path`
    pub fn create(
        path: impl AsRef<Path>,
        id: RepositoryId,
        priority: i32,
        local: bool,
    ) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, id, priority, local)
    }

    /// Create a throwaway store in memory
    pub fn create_in_memory(id: RepositoryId, priority: i32, local: bool) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, id, priority, local)
    }

    fn init(conn: Connection, id: RepositoryId, priority: i32, local: bool) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrate(&conn)?;

        let name = match &id {
            RepositoryId::Installed => None,
            RepositoryId::Named(name) => Some(name.as_str()),
        };
        conn.execute(
            "INSERT INTO store_info (id, name, priority, local) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = ?1, priority = ?2, local = ?3",
            params![name, priority, local as i32],
        )?;

        Ok(Self {
            conn,
            id,
            priority,
            local,
        })
    }

    /// Open an existing store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrate(&conn)?;

        let (name, priority, local): (Option<String>, i32, i32) = conn.query_row(
            "SELECT name, priority, local FROM store_info WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let id = match name {
            Some(name) => RepositoryId::Named(name),
            None => RepositoryId::Installed,
        };
        debug!("Opened store {} (priority {})", id, priority);

        Ok(Self {
            conn,
            id,
            priority,
            local: local != 0,
        })
    }

    /// Insert a package record, returning its id
    pub fn insert(&mut self, record: &PackageRecord, system: bool) -> Result<PackageId> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO packages (key, slot, version, tag, revision, branch, system)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &record.key,
                &record.slot,
                &record.version,
                &record.tag,
                record.revision,
                &record.branch,
                system as i32,
            ],
        )?;
        let id = tx.last_insert_rowid();

        for (pos, dep) in record.dependencies.iter().enumerate() {
            let dep_key = Specifier::parse(&dep.spec)?.key().to_string();
            tx.execute(
                "INSERT INTO dependencies (package_id, position, spec, dep_key, kind)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, pos as i64, &dep.spec, dep_key, dep.kind.as_str()],
            )?;
        }
        for (pos, spec) in record.conflicts.iter().enumerate() {
            tx.execute(
                "INSERT INTO conflicts (package_id, position, spec) VALUES (?1, ?2, ?3)",
                params![id, pos as i64, spec],
            )?;
        }
        for (pos, key) in record.provides.iter().enumerate() {
            tx.execute(
                "INSERT INTO provides (package_id, position, virtual_key) VALUES (?1, ?2, ?3)",
                params![id, pos as i64, key],
            )?;
        }
        for (direction, libs) in [
            ("needed", &record.needed),
            ("provided", &record.provided_libraries),
        ] {
            for (pos, lib) in libs.iter().enumerate() {
                tx.execute(
                    "INSERT INTO libraries (package_id, position, soname, elfclass, direction)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, pos as i64, &lib.soname, lib.elfclass, direction],
                )?;
            }
        }
        for (kind, values) in [("license", &record.licenses), ("keyword", &record.keywords)] {
            for (pos, value) in values.iter().enumerate() {
                tx.execute(
                    "INSERT INTO labels (package_id, position, value, kind) VALUES (?1, ?2, ?3, ?4)",
                    params![id, pos as i64, value, kind],
                )?;
            }
        }

        tx.commit()?;
        debug!("Inserted {} as {} into {}", record.atom(), id, self.id);
        Ok(id)
    }

    fn package_from_row(row: &Row) -> rusqlite::Result<PackageRecord> {
        let mut record = PackageRecord::new(row.get::<_, String>(0)?, row.get::<_, String>(2)?);
        record.slot = row.get(1)?;
        record.tag = row.get(3)?;
        record.revision = row.get(4)?;
        record.branch = row.get(5)?;
        Ok(record)
    }

    fn query_ids(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<PackageId>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map(args, |row| row.get(0))?
            .collect::<std::result::Result<Vec<PackageId>, _>>()?;
        Ok(ids)
    }

    fn query_strings(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let values = stmt
            .query_map(args, |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(values)
    }

    fn libraries(&self, id: PackageId, direction: &str) -> Result<Vec<LinkedLibrary>> {
        let mut stmt = self.conn.prepare(
            "SELECT soname, elfclass FROM libraries
             WHERE package_id = ?1 AND direction = ?2 ORDER BY position",
        )?;
        let libs = stmt
            .query_map(params![id, direction], |row| {
                Ok(LinkedLibrary::new(row.get::<_, String>(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(libs)
    }
}

impl PackageStore for SqliteStore {
    fn repository_id(&self) -> &RepositoryId {
        &self.id
    }

    fn repository_priority(&self) -> i32 {
        self.priority
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn candidates_by_key(&self, key: &str, slot: Option<&str>) -> Result<Vec<PackageId>> {
        match slot {
            Some(slot) => self.query_ids(
                "SELECT id FROM packages WHERE key = ?1 AND slot = ?2 ORDER BY id",
                params![key, slot],
            ),
            None => self.query_ids(
                "SELECT id FROM packages WHERE key = ?1 ORDER BY id",
                params![key],
            ),
        }
    }

    fn providers_of(&self, virtual_key: &str) -> Result<Vec<PackageId>> {
        self.query_ids(
            "SELECT DISTINCT package_id FROM provides WHERE virtual_key = ?1 ORDER BY package_id",
            params![virtual_key],
        )
    }

    fn record(&self, id: PackageId) -> Result<PackageRecord> {
        let mut record = self
            .conn
            .query_row(
                "SELECT key, slot, version, tag, revision, branch FROM packages WHERE id = ?1",
                [id],
                Self::package_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::UnknownPackage {
                id,
                repository: self.id.to_string(),
            })?;

        let mut stmt = self.conn.prepare(
            "SELECT spec, kind FROM dependencies WHERE package_id = ?1 ORDER BY position",
        )?;
        record.dependencies = stmt
            .query_map([id], |row| {
                let kind: String = row.get(1)?;
                Ok(Dependency {
                    spec: row.get(0)?,
                    kind: if kind == "optional" {
                        DependencyKind::Optional
                    } else {
                        DependencyKind::Runtime
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        record.conflicts = self.query_strings(
            "SELECT spec FROM conflicts WHERE package_id = ?1 ORDER BY position",
            [id],
        )?;
        record.provides = self.query_strings(
            "SELECT virtual_key FROM provides WHERE package_id = ?1 ORDER BY position",
            [id],
        )?;
        record.needed = self.libraries(id, "needed")?;
        record.provided_libraries = self.libraries(id, "provided")?;
        record.licenses = self.query_strings(
            "SELECT value FROM labels WHERE package_id = ?1 AND kind = 'license' ORDER BY position",
            [id],
        )?;
        record.keywords = self.query_strings(
            "SELECT value FROM labels WHERE package_id = ?1 AND kind = 'keyword' ORDER BY position",
            [id],
        )?;

        Ok(record)
    }

    fn reverse_dependents(&self, id: PackageId) -> Result<Vec<PackageId>> {
        let target = self.record(id)?;

        let mut stmt = self.conn.prepare(
            "SELECT package_id, spec FROM dependencies
             WHERE dep_key = ?1 AND kind = 'runtime' AND package_id != ?2
             ORDER BY package_id, position",
        )?;

        let mut dependents = Vec::new();
        for key in std::iter::once(&target.key).chain(target.provides.iter()) {
            let rows = stmt
                .query_map(params![key, id], |row| {
                    Ok((row.get::<_, PackageId>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            for (dependent, spec) in rows {
                if dependents.contains(&dependent) {
                    continue;
                }
                if target.satisfies(&Specifier::parse(&spec)?)? {
                    dependents.push(dependent);
                }
            }
        }

        dependents.sort_unstable();
        Ok(dependents)
    }

    fn is_system_package(&self, id: PackageId) -> Result<bool> {
        let system: Option<i32> = self
            .conn
            .query_row("SELECT system FROM packages WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(system.unwrap_or(0) != 0)
    }

    fn library_consumers(&self, library: &LinkedLibrary) -> Result<Vec<PackageId>> {
        self.query_ids(
            "SELECT DISTINCT package_id FROM libraries
             WHERE soname = ?1 AND elfclass = ?2 AND direction = 'needed' ORDER BY package_id",
            params![&library.soname, library.elfclass],
        )
    }

    fn library_providers(&self, library: &LinkedLibrary) -> Result<Vec<PackageId>> {
        self.query_ids(
            "SELECT DISTINCT package_id FROM libraries
             WHERE soname = ?1 AND elfclass = ?2 AND direction = 'provided' ORDER BY package_id",
            params![&library.soname, library.elfclass],
        )
    }

    fn checksum(&self) -> Result<String> {
        let mut hasher = Hasher::new();
        hasher.update_json(&self.id)?;
        hasher.update(&self.priority.to_le_bytes());
        hasher.update(&[self.local as u8]);

        let ids = self.query_ids("SELECT id FROM packages ORDER BY id", [])?;
        for id in ids {
            hasher.update(&id.to_le_bytes());
            hasher.update(&[self.is_system_package(id)? as u8]);
            hasher.update_json(&self.record(id)?)?;
        }
        Ok(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_record() -> PackageRecord {
        let mut record = PackageRecord::new("app/foo", "1.2");
        record.slot = "1".to_string();
        record.tag = Some("t".to_string());
        record.revision = 2;
        record.dependencies = vec![
            Dependency::runtime(">=lib/z-1.0"),
            Dependency::optional("app/docs"),
        ];
        record.conflicts = vec!["app/bar".to_string()];
        record.provides = vec!["virtual/foo".to_string()];
        record.needed = vec![LinkedLibrary::new("libz.so.1", 64)];
        record.provided_libraries = vec![LinkedLibrary::new("libfoo.so.1", 64)];
        record.licenses = vec!["MIT".to_string()];
        record.keywords = vec!["amd64".to_string()];
        record
    }

    #[test]
    fn test_record_roundtrip() {
        let mut store =
            SqliteStore::create_in_memory(RepositoryId::named("main"), 0, false).unwrap();
        let record = sample_record();
        let id = store.insert(&record, false).unwrap();

        assert_eq!(store.record(id).unwrap(), record);
        assert_eq!(store.candidates_by_key("app/foo", Some("1")).unwrap(), vec![id]);
        assert!(store.candidates_by_key("app/foo", Some("2")).unwrap().is_empty());
        assert_eq!(store.providers_of("virtual/foo").unwrap(), vec![id]);
    }

    #[test]
    fn test_reopen_keeps_identity() {
        let temp_file = NamedTempFile::new().unwrap();
        {
            let mut store =
                SqliteStore::create(temp_file.path(), RepositoryId::Installed, 0, false).unwrap();
            store.insert(&sample_record(), true).unwrap();
        }

        let store = SqliteStore::open(temp_file.path()).unwrap();
        assert_eq!(store.repository_id(), &RepositoryId::Installed);
        let ids = store.candidates_by_key("app/foo", None).unwrap();
        assert_eq!(ids.len(), 1);
        assert!(store.is_system_package(ids[0]).unwrap());
    }

    #[test]
    fn test_reverse_dependents_and_libraries() {
        let mut store = SqliteStore::create_in_memory(RepositoryId::Installed, 0, false).unwrap();
        let mut zlib = PackageRecord::new("lib/z", "1.3");
        zlib.provided_libraries = vec![LinkedLibrary::new("libz.so.1", 64)];
        let z = store.insert(&zlib, false).unwrap();
        let foo = store.insert(&sample_record(), false).unwrap();

        let mut old = PackageRecord::new("app/old", "1.0");
        old.dependencies = vec![Dependency::runtime("<lib/z-1.0")];
        store.insert(&old, false).unwrap();

        assert_eq!(store.reverse_dependents(z).unwrap(), vec![foo]);
        let libz = LinkedLibrary::new("libz.so.1", 64);
        assert_eq!(store.library_consumers(&libz).unwrap(), vec![foo]);
        assert_eq!(store.library_providers(&libz).unwrap(), vec![z]);
    }

    #[test]
    fn test_checksum_tracks_inserts() {
        let mut store =
            SqliteStore::create_in_memory(RepositoryId::named("main"), 0, false).unwrap();
        let empty = store.checksum().unwrap();
        store.insert(&sample_record(), false).unwrap();
        assert_ne!(empty, store.checksum().unwrap());
    }
}
