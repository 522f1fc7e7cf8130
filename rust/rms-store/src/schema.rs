//! Schema DDL, exactly the tables spec.md §6 names: pipes, tasks,
//! resources, fileresources, task_inputs, task_outputs, info_flags.

use rms_common::rusqlite::Connection;
use rms_graph::Result;

pub const CURRENT_VERSION: i32 = 1;

pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS schema_meta (
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pipes (
            id INTEGER PRIMARY KEY,
            identity_kind TEXT NOT NULL,
            module TEXT,
            qualified_name TEXT,
            source_hash TEXT,
            schema_json TEXT NOT NULL,
            return_volatile INTEGER NOT NULL,
            is_deterministic INTEGER NOT NULL,
            output_func INTEGER REFERENCES pipes(id),
            description TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_pipes_identity
            ON pipes(identity_kind, COALESCE(module, ''), COALESCE(qualified_name, ''), COALESCE(source_hash, ''));

        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY,
            pipe_id INTEGER NOT NULL REFERENCES pipes(id),
            args_json TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            description TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_fingerprint ON tasks(fingerprint);

        CREATE TABLE IF NOT EXISTS resources (
            id INTEGER PRIMARY KEY,
            producing_task INTEGER NOT NULL REFERENCES tasks(id),
            ordinal INTEGER NOT NULL,
            volatile INTEGER NOT NULL,
            vault_hash TEXT,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS fileresources (
            id INTEGER PRIMARY KEY,
            path TEXT NOT NULL,
            size INTEGER NOT NULL,
            md5 TEXT NOT NULL,
            producing_task INTEGER REFERENCES tasks(id),
            description TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_fileresources_path ON fileresources(path);

        CREATE TABLE IF NOT EXISTS task_outputs (
            task_id INTEGER NOT NULL REFERENCES tasks(id),
            position INTEGER NOT NULL,
            node_kind TEXT NOT NULL,
            node_id INTEGER NOT NULL,
            PRIMARY KEY (task_id, position)
        );

        CREATE TABLE IF NOT EXISTS task_inputs (
            task_id INTEGER NOT NULL REFERENCES tasks(id),
            position INTEGER NOT NULL,
            arg_name TEXT NOT NULL,
            node_kind TEXT,
            node_id INTEGER,
            literal_json TEXT,
            PRIMARY KEY (task_id, position)
        );
        CREATE INDEX IF NOT EXISTS idx_task_inputs_node ON task_inputs(node_kind, node_id);

        CREATE TABLE IF NOT EXISTS info_flags (
            node_kind TEXT NOT NULL,
            node_id INTEGER NOT NULL,
            flag TEXT NOT NULL,
            text TEXT,
            PRIMARY KEY (node_kind, node_id, flag)
        );
        "#,
    )?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);
    if version == 0 {
        conn.execute(
            "INSERT INTO schema_meta(version) VALUES (?1)",
            [CURRENT_VERSION],
        )?;
    }

    Ok(())
}
