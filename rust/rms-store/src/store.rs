//! C2: the durable, transactional store. A single SQLite file accessed
//! through a mutex-guarded [`rusqlite::Connection`] — the Store is the only
//! shared mutable resource in the engine (spec.md §5), so a single
//! connection behind a lock is sufficient and keeps the "Task exists iff
//! its outputs exist" invariant trivially true (one transaction per
//! `put_task`).

use std::path::{Path, PathBuf};

use rms_common::chrono::{DateTime, Utc};
use rms_common::parking_lot::Mutex;
use rms_common::rusqlite::{self, params, Connection, OptionalExtension};
use rms_fingerprint::NodeLookup;
use rms_graph::{
    ArgSchema, BoundArgs, Error, FileResource, FileResourceId, Fingerprint, InfoFlag, InfoSet,
    NodeId, Pipe, PipeId, PipeIdentity, Resource, ResourceId, Result, Task, TaskId, Value,
};

use crate::codec::{decode_args, decode_schema, encode_args, encode_schema, EntityKind};
use crate::entities::{entity_kind_id, md5_from_hex, md5_to_hex, node_from_kind_id, node_kind_id};
use crate::schema;
use crate::EntityRef;

pub struct Store {
    conn: Mutex<Connection>,
}

/// Everything needed to persist a freshly completed Task in one
/// transaction: its bound arguments and the concrete outputs the Pipe (and
/// its `output_func`) produced, in ordinal order.
pub struct NewTask {
    pub pipe_id: PipeId,
    pub args: BoundArgs,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
    pub outputs: Vec<NewOutput>,
    pub description: Option<String>,
}

pub enum NewOutput {
    Resource {
        volatile: bool,
        vault_hash: Option<String>,
        description: Option<String>,
    },
    FileResource {
        path: PathBuf,
        size: u64,
        md5: [u8; 16],
        description: Option<String>,
    },
}

/// Specification for registering a Pipe; see `rms-pipes` for the identity
/// resolution that produces one of these.
pub struct PipeSpec {
    pub identity: PipeIdentity,
    pub schema: ArgSchema,
    pub return_volatile: bool,
    pub is_deterministic: bool,
    pub output_func: Option<PipeId>,
    pub description: Option<String>,
    pub source_code: Option<String>,
    pub output_func_source_code: Option<String>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside a single SQLite transaction; `f`'s error causes a
    /// rollback so no partial writes are observable (spec.md §4.2, §7).
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    // ---- Pipes ---------------------------------------------------------

    /// Idempotent by identity: re-registering the same identity with
    /// compatible attributes returns the existing Pipe's id.
    pub fn put_pipe(&self, spec: PipeSpec) -> Result<PipeId> {
        let conn = self.conn.lock();
        if let Some(existing) = Self::find_pipe_by_identity(&conn, &spec.identity)? {
            if existing.schema != spec.schema
                || existing.return_volatile != spec.return_volatile
                || existing.is_deterministic != spec.is_deterministic
                || existing.output_func != spec.output_func
            {
                return Err(Error::PipeRegistrationConflict(spec.identity));
            }
            return Ok(existing.id);
        }

        let (identity_kind, module, qualified_name, source_hash) = match &spec.identity {
            PipeIdentity::Named {
                module,
                qualified_name,
            } => ("named", Some(module.clone()), Some(qualified_name.clone()), None),
            PipeIdentity::Anonymous { source_hash } => {
                ("anonymous", None, None, Some(source_hash.clone()))
            }
        };

        conn.execute(
            "INSERT INTO pipes(identity_kind, module, qualified_name, source_hash, schema_json, \
             return_volatile, is_deterministic, output_func, description) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                identity_kind,
                module,
                qualified_name,
                source_hash,
                encode_schema(&spec.schema)?,
                spec.return_volatile as i64,
                spec.is_deterministic as i64,
                spec.output_func.map(|id| id.0),
                spec.description,
            ],
        )?;
        let id = PipeId(conn.last_insert_rowid());

        if let Some(source) = &spec.source_code {
            Self::set_info_inner(&conn, EntityRef::Pipe(id), InfoFlag::SourceCode, Some(source.clone()))?;
        }
        if let Some(source) = &spec.output_func_source_code {
            Self::set_info_inner(
                &conn,
                EntityRef::Pipe(id),
                InfoFlag::OutputFuncSourceCode,
                Some(source.clone()),
            )?;
        }

        Ok(id)
    }

    fn find_pipe_by_identity(conn: &Connection, identity: &PipeIdentity) -> Result<Option<Pipe>> {
        let (identity_kind, module, qualified_name, source_hash) = match identity {
            PipeIdentity::Named {
                module,
                qualified_name,
            } => ("named", Some(module.as_str()), Some(qualified_name.as_str()), None),
            PipeIdentity::Anonymous { source_hash } => {
                ("anonymous", None, None, Some(source_hash.as_str()))
            }
        };
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM pipes WHERE identity_kind = ?1 \
                 AND COALESCE(module,'') = COALESCE(?2,'') \
                 AND COALESCE(qualified_name,'') = COALESCE(?3,'') \
                 AND COALESCE(source_hash,'') = COALESCE(?4,'')",
                params![identity_kind, module, qualified_name, source_hash],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => Ok(Some(Self::load_pipe(conn, PipeId(id))?)),
            None => Ok(None),
        }
    }

    fn load_pipe(conn: &Connection, id: PipeId) -> Result<Pipe> {
        conn.query_row(
            "SELECT identity_kind, module, qualified_name, source_hash, schema_json, \
             return_volatile, is_deterministic, output_func, description \
             FROM pipes WHERE id = ?1",
            params![id.0],
            |row| {
                let identity_kind: String = row.get(0)?;
                let module: Option<String> = row.get(1)?;
                let qualified_name: Option<String> = row.get(2)?;
                let source_hash: Option<String> = row.get(3)?;
                let identity = if identity_kind == "named" {
                    PipeIdentity::Named {
                        module: module.unwrap_or_default(),
                        qualified_name: qualified_name.unwrap_or_default(),
                    }
                } else {
                    PipeIdentity::Anonymous {
                        source_hash: source_hash.unwrap_or_default(),
                    }
                };
                let schema_json: String = row.get(4)?;
                let return_volatile: i64 = row.get(5)?;
                let is_deterministic: i64 = row.get(6)?;
                let output_func: Option<i64> = row.get(7)?;
                let description: Option<String> = row.get(8)?;
                Ok((
                    identity,
                    schema_json,
                    return_volatile,
                    is_deterministic,
                    output_func,
                    description,
                ))
            },
        )
        .map_err(Error::from)
        .and_then(
            |(identity, schema_json, return_volatile, is_deterministic, output_func, description)| {
                Ok(Pipe {
                    id,
                    identity,
                    schema: decode_schema(&schema_json)?,
                    return_volatile: return_volatile != 0,
                    is_deterministic: is_deterministic != 0,
                    output_func: output_func.map(PipeId),
                    description,
                    info: self_info(conn, EntityRef::Pipe(id))?,
                })
            },
        )
    }

    pub fn get_pipe(&self, id: PipeId) -> Result<Option<Pipe>> {
        let conn = self.conn.lock();
        match Self::load_pipe(&conn, id) {
            Ok(pipe) => Ok(Some(pipe)),
            Err(Error::StoreError(rusqlite::Error::QueryReturnedNoRows)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn tasks_by_pipe(&self, pipe_id: PipeId) -> Result<Vec<TaskId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM tasks WHERE pipe_id = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![pipe_id.0], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(TaskId))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    // ---- Tasks ----------------------------------------------------------

    pub fn get_task_by_fingerprint(&self, fp: Fingerprint) -> Result<Option<Task>> {
        let conn = self.conn.lock();
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM tasks WHERE fingerprint = ?1",
                params![fp.to_hex()],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => Ok(Some(Self::load_task(&conn, TaskId(id))?)),
            None => Ok(None),
        }
    }

    pub fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let conn = self.conn.lock();
        match Self::load_task(&conn, id) {
            Ok(t) => Ok(Some(t)),
            Err(Error::StoreError(rusqlite::Error::QueryReturnedNoRows)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn load_task(conn: &Connection, id: TaskId) -> Result<Task> {
        let (pipe_id, args_json, started_at, finished_at, fingerprint_hex, description): (
            i64,
            String,
            DateTime<Utc>,
            DateTime<Utc>,
            String,
            Option<String>,
        ) = conn.query_row(
            "SELECT pipe_id, args_json, started_at, finished_at, fingerprint, description \
             FROM tasks WHERE id = ?1",
            params![id.0],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )?;

        let mut stmt = conn.prepare(
            "SELECT node_kind, node_id FROM task_outputs WHERE task_id = ?1 ORDER BY position",
        )?;
        let outputs = stmt
            .query_map(params![id.0], |row| {
                let kind: String = row.get(0)?;
                let node_id: i64 = row.get(1)?;
                Ok((kind, node_id))
            })?
            .map(|r| -> Result<NodeId> {
                let (kind, node_id) = r?;
                node_from_kind_id(&kind, node_id)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Task {
            id,
            pipe_id: PipeId(pipe_id),
            args: decode_args(&args_json)?,
            started_at,
            finished_at,
            fingerprint: Fingerprint::from_hex(&fingerprint_hex)
                .ok_or_else(|| Error::SchemaError("malformed fingerprint".into()))?,
            outputs,
            description,
            info: self_info(conn, EntityRef::Task(id))?,
        })
    }

    /// Persist a just-completed Task and its owned outputs in one
    /// transaction (spec.md §4.2/§7: a crash before commit leaves no
    /// partial Task).
    pub fn put_task(&self, new_task: NewTask) -> Result<Task> {
        self.transaction(|tx| {
            tx.execute(
                "INSERT INTO tasks(pipe_id, args_json, started_at, finished_at, fingerprint, description) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new_task.pipe_id.0,
                    encode_args(&new_task.args)?,
                    new_task.started_at,
                    new_task.finished_at,
                    new_task.fingerprint.to_hex(),
                    new_task.description,
                ],
            )?;
            let task_id = TaskId(tx.last_insert_rowid());

            let mut outputs = Vec::with_capacity(new_task.outputs.len());
            for (ordinal, output) in new_task.outputs.into_iter().enumerate() {
                let node = match output {
                    NewOutput::Resource {
                        volatile,
                        vault_hash,
                        description,
                    } => {
                        tx.execute(
                            "INSERT INTO resources(producing_task, ordinal, volatile, vault_hash, description) \
                             VALUES (?1, ?2, ?3, ?4, ?5)",
                            params![task_id.0, ordinal as i64, volatile as i64, vault_hash, description],
                        )?;
                        NodeId::Resource(ResourceId(tx.last_insert_rowid()))
                    }
                    NewOutput::FileResource {
                        path,
                        size,
                        md5,
                        description,
                    } => {
                        tx.execute(
                            "INSERT INTO fileresources(path, size, md5, producing_task, description) \
                             VALUES (?1, ?2, ?3, ?4, ?5)",
                            params![
                                path.to_string_lossy().to_string(),
                                size as i64,
                                md5_to_hex(md5),
                                task_id.0,
                                description,
                            ],
                        )?;
                        NodeId::FileResource(FileResourceId(tx.last_insert_rowid()))
                    }
                };
                let (kind, id) = node_kind_id(node);
                tx.execute(
                    "INSERT INTO task_outputs(task_id, position, node_kind, node_id) VALUES (?1, ?2, ?3, ?4)",
                    params![task_id.0, ordinal as i64, kind, id],
                )?;
                outputs.push(node);
            }

            write_task_inputs(tx, task_id, &new_task.args)?;

            Ok(Task {
                id: task_id,
                pipe_id: new_task.pipe_id,
                args: new_task.args,
                started_at: new_task.started_at,
                finished_at: new_task.finished_at,
                fingerprint: new_task.fingerprint,
                outputs,
                description: new_task.description,
                info: InfoSet::new(),
            })
        })
    }

    // ---- Resources / FileResources --------------------------------------

    pub fn get_resource(&self, id: ResourceId) -> Result<Option<Resource>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT producing_task, ordinal, volatile, vault_hash, description \
                 FROM resources WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((producing_task, ordinal, volatile, vault_hash, description)) = row else {
            return Ok(None);
        };
        Ok(Some(Resource {
            id,
            producing_task: TaskId(producing_task),
            ordinal: ordinal as u32,
            volatile: volatile != 0,
            vault_hash,
            description,
            info: self_info(&conn, EntityRef::Resource(id))?,
        }))
    }

    pub fn get_file_resource(&self, id: FileResourceId) -> Result<Option<FileResource>> {
        let conn = self.conn.lock();
        Self::load_file_resource(&conn, id)
    }

    fn load_file_resource(conn: &Connection, id: FileResourceId) -> Result<Option<FileResource>> {
        let row = conn
            .query_row(
                "SELECT path, size, md5, producing_task, description FROM fileresources WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((path, size, md5_hex, producing_task, description)) = row else {
            return Ok(None);
        };
        Ok(Some(FileResource {
            id,
            path: PathBuf::from(path),
            size: size as u64,
            md5: md5_from_hex(&md5_hex)?,
            producing_task: producing_task.map(TaskId),
            description,
            info: self_info(conn, EntityRef::FileResource(id))?,
        }))
    }

    /// The current non-overwritten FileResource at `path`, if any
    /// (invariant 3: at most one such row exists).
    pub fn file_resource_at_path(&self, path: &Path) -> Result<Option<FileResource>> {
        let conn = self.conn.lock();
        let path_str = path.to_string_lossy().to_string();
        let mut stmt = conn.prepare(
            "SELECT fr.id FROM fileresources fr \
             WHERE fr.path = ?1 \
             AND NOT EXISTS (SELECT 1 FROM info_flags f \
                WHERE f.node_kind = 'file_resource' AND f.node_id = fr.id AND f.flag = 'overwritten')",
        )?;
        let id: Option<i64> = stmt
            .query_row(params![path_str], |row| row.get(0))
            .optional()?;
        match id {
            Some(id) => Self::load_file_resource(&conn, FileResourceId(id)),
            None => Ok(None),
        }
    }

    /// Insert a brand new FileResource row. Overwrite bookkeeping (marking
    /// the prior non-overwritten row) is the caller's responsibility
    /// (`rms-files`), since it also needs to enforce invariant 3 atomically
    /// with the insert.
    pub fn insert_file_resource(
        &self,
        path: &Path,
        size: u64,
        md5: [u8; 16],
        producing_task: Option<TaskId>,
        description: Option<String>,
    ) -> Result<FileResource> {
        self.transaction(|tx| {
            tx.execute(
                "INSERT INTO fileresources(path, size, md5, producing_task, description) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    path.to_string_lossy().to_string(),
                    size as i64,
                    md5_to_hex(md5),
                    producing_task.map(|t| t.0),
                    description,
                ],
            )?;
            let id = FileResourceId(tx.last_insert_rowid());
            Ok(FileResource {
                id,
                path: path.to_path_buf(),
                size,
                md5,
                producing_task,
                description,
                info: InfoSet::new(),
            })
        })
    }

    // ---- Graph traversal primitives (used by rms-query) ------------------

    pub fn producing_task(&self, node: NodeId) -> Result<Option<TaskId>> {
        match node {
            NodeId::Resource(id) => Ok(self.get_resource(id)?.map(|r| r.producing_task)),
            NodeId::FileResource(id) => Ok(self.get_file_resource(id)?.and_then(|f| f.producing_task)),
        }
    }

    pub fn input_nodes(&self, task_id: TaskId) -> Result<Vec<NodeId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT node_kind, node_id FROM task_inputs \
             WHERE task_id = ?1 AND node_kind IS NOT NULL",
        )?;
        let rows = stmt
            .query_map(params![task_id.0], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .map(|r| -> Result<NodeId> {
                let (kind, id) = r?;
                node_from_kind_id(&kind, id)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn consumers(&self, node: NodeId) -> Result<Vec<TaskId>> {
        let conn = self.conn.lock();
        let (kind, id) = node_kind_id(node);
        let mut stmt = conn.prepare(
            "SELECT DISTINCT task_id FROM task_inputs WHERE node_kind = ?1 AND node_id = ?2 ORDER BY task_id",
        )?;
        let ids = stmt
            .query_map(params![kind, id], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(TaskId))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn output_nodes(&self, task_id: TaskId) -> Result<Vec<NodeId>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT node_kind, node_id FROM task_outputs WHERE task_id = ?1 ORDER BY position")?;
        let rows = stmt
            .query_map(params![task_id.0], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .map(|r| -> Result<NodeId> {
                let (kind, id) = r?;
                node_from_kind_id(&kind, id)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn all_task_ids(&self) -> Result<Vec<TaskId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM tasks ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(TaskId))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Every FileResource row, including ones registered directly
    /// (`register_file`, no producing Task) and thus invisible to a
    /// Task-output traversal.
    pub fn all_file_resource_ids(&self) -> Result<Vec<FileResourceId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM fileresources ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(FileResourceId))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    // ---- info flags -------------------------------------------------------

    pub fn mark_info(&self, entity: EntityRef, flag: InfoFlag, on: bool) -> Result<()> {
        let conn = self.conn.lock();
        if on {
            Self::set_info_inner(&conn, entity, flag, None)
        } else {
            let (kind, id) = entity_kind_id(entity);
            conn.execute(
                "DELETE FROM info_flags WHERE node_kind = ?1 AND node_id = ?2 AND flag = ?3",
                params![kind, id, flag_name(flag)],
            )?;
            Ok(())
        }
    }

    fn set_info_inner(
        conn: &Connection,
        entity: EntityRef,
        flag: InfoFlag,
        text: Option<String>,
    ) -> Result<()> {
        let (kind, id) = entity_kind_id(entity);
        conn.execute(
            "INSERT INTO info_flags(node_kind, node_id, flag, text) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(node_kind, node_id, flag) DO UPDATE SET text = excluded.text",
            params![kind, id, flag_name(flag), text],
        )?;
        Ok(())
    }

    pub fn info(&self, entity: EntityRef) -> Result<InfoSet> {
        let conn = self.conn.lock();
        self_info(&conn, entity)
    }
}

fn flag_name(flag: InfoFlag) -> &'static str {
    match flag {
        InfoFlag::Overwritten => "overwritten",
        InfoFlag::Obsolete => "obsolete",
        InfoFlag::SourceCode => "sourcecode",
        InfoFlag::OutputFuncSourceCode => "outputfunc_sourcecode",
        InfoFlag::Deprecated => "deprecated",
    }
}

fn flag_from_name(name: &str) -> Option<InfoFlag> {
    Some(match name {
        "overwritten" => InfoFlag::Overwritten,
        "obsolete" => InfoFlag::Obsolete,
        "sourcecode" => InfoFlag::SourceCode,
        "outputfunc_sourcecode" => InfoFlag::OutputFuncSourceCode,
        "deprecated" => InfoFlag::Deprecated,
        _ => return None,
    })
}

fn self_info(conn: &Connection, entity: EntityRef) -> Result<InfoSet> {
    let (kind, id) = entity_kind_id(entity);
    let mut stmt = conn.prepare("SELECT flag, text FROM info_flags WHERE node_kind = ?1 AND node_id = ?2")?;
    let mut set = InfoSet::new();
    let rows = stmt.query_map(params![kind, id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;
    for row in rows {
        let (name, text) = row?;
        if let Some(flag) = flag_from_name(&name) {
            match text {
                Some(text) => set.set_with_text(flag, text),
                None => set.set(flag),
            }
        }
    }
    Ok(set)
}

/// Walk a [`Value`] for every directly- or transitively-referenced
/// Resource/FileResource and record one `task_inputs` row per reference,
/// plus one literal-only row for arguments that contain no references at
/// all (so every bound argument is represented, matching spec.md §6's
/// `task_inputs (task_id, position, node_id | literal_blob)`).
fn write_task_inputs(tx: &rusqlite::Transaction, task_id: TaskId, args: &BoundArgs) -> Result<()> {
    let mut position = 0i64;
    let named = args
        .positional
        .iter()
        .enumerate()
        .map(|(i, v)| (format!("${i}"), v))
        .collect::<Vec<_>>();
    for (name, value) in named.iter().map(|(n, v)| (n.as_str(), *v)).chain(
        args.keyword.iter().map(|(n, v)| (n.as_str(), v)),
    ) {
        let mut refs = Vec::new();
        collect_node_refs(value, &mut refs);
        if refs.is_empty() {
            let literal = rms_common::serde_json::to_string(value)
                .map_err(|e| Error::SchemaError(e.to_string()))?;
            tx.execute(
                "INSERT INTO task_inputs(task_id, position, arg_name, node_kind, node_id, literal_json) \
                 VALUES (?1, ?2, ?3, NULL, NULL, ?4)",
                params![task_id.0, position, name, literal],
            )?;
            position += 1;
        } else {
            for node in refs {
                let (kind, id) = node_kind_id(node);
                tx.execute(
                    "INSERT INTO task_inputs(task_id, position, arg_name, node_kind, node_id, literal_json) \
                     VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
                    params![task_id.0, position, name, kind, id],
                )?;
                position += 1;
            }
        }
    }
    Ok(())
}

fn collect_node_refs(value: &Value, out: &mut Vec<NodeId>) {
    match value {
        Value::Resource(id) => out.push(NodeId::Resource(*id)),
        Value::FileResource(id) => out.push(NodeId::FileResource(*id)),
        Value::Seq(items) | Value::Set(items) => {
            for item in items {
                collect_node_refs(item, out);
            }
        }
        Value::Map(pairs) => {
            for (k, v) in pairs {
                collect_node_refs(k, out);
                collect_node_refs(v, out);
            }
        }
        _ => {}
    }
}

impl NodeLookup for Store {
    fn producing_fingerprint(&self, id: ResourceId) -> Option<Fingerprint> {
        let resource = self.get_resource(id).ok()??;
        let task = self.get_task(resource.producing_task).ok()??;
        Some(task.fingerprint)
    }

    fn ordinal(&self, id: ResourceId) -> Option<u32> {
        let resource = self.get_resource(id).ok()??;
        Some(resource.ordinal)
    }

    fn file_md5(&self, id: FileResourceId) -> Option<[u8; 16]> {
        let file_resource = self.get_file_resource(id).ok()??;
        Some(file_resource.md5)
    }
}
