//! In-memory driver for tests.
//!
//! [`MockDriver`] implements [`NativeApi`] over a small model of a driver
//! manager: a handle tree, data sources with credentials, a registry of
//! statement texts and their responses, and per-handle diagnostics. Return
//! codes can be scripted per native function to exercise error paths.
//!
//! Bound parameter buffers are read (and output buffers written) at execute
//! time through the raw pointers handed to `bind_parameter`, the way a real
//! driver does.

mod data;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

pub use data::{MockColumn, MockResponse, MockValue};

use crate::diagnostics::{DiagnosticRecord, State as SqlState};
use crate::ffi::{
    AttrOdbcVersion, CDataType, CompletionType, FetchOrientation, FreeStmtOption, HandleKind,
    NO_TOTAL, NULL_DATA, NativeApi, ParamDirection, RawHandle, SqlDataType, SqlReturn,
};

/// Native functions, for scripting and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFunction {
    AllocHandle,
    FreeHandle,
    GetDiagRec,
    SetEnvAttr,
    DataSources,
    Drivers,
    Connect,
    DriverConnect,
    Disconnect,
    SetConnectAttr,
    EndTran,
    Prepare,
    ExecDirect,
    Execute,
    NumResultCols,
    RowCount,
    DescribeCol,
    Tables,
    Fetch,
    GetData,
    BindParameter,
    CloseCursor,
    FreeStmt,
}

#[derive(Debug)]
enum Script {
    /// Return the code without doing anything.
    Code(SqlReturn),
    /// Fail with these records.
    Fail(Vec<DiagnosticRecord>),
    /// Do the work, then downgrade success to `SuccessWithInfo`.
    Warn(DiagnosticRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    User,
    System,
}

#[derive(Debug)]
struct DataSource {
    name: String,
    description: String,
    user: Option<String>,
    password: Option<String>,
    scope: Scope,
}

#[derive(Debug)]
struct Binding {
    direction: ParamDirection,
    c_type: CDataType,
    value: usize,
    buffer_length: isize,
    indicator: usize,
}

#[derive(Debug)]
struct Cursor {
    columns: Vec<MockColumn>,
    rows: Vec<Vec<MockValue>>,
    position: Option<usize>,
    offsets: HashMap<u16, usize>,
    finished: HashSet<u16>,
}

impl Cursor {
    fn new(columns: Vec<MockColumn>, rows: Vec<Vec<MockValue>>) -> Self {
        Self {
            columns,
            rows,
            position: None,
            offsets: HashMap::new(),
            finished: HashSet::new(),
        }
    }

    fn current(&self) -> Option<&Vec<MockValue>> {
        self.position.and_then(|row| self.rows.get(row))
    }
}

#[derive(Debug)]
struct Node {
    kind: HandleKind,
    parent: Option<usize>,
    diagnostics: Vec<DiagnosticRecord>,
    // Environment
    version: Option<AttrOdbcVersion>,
    listing: Option<(FetchOrientation, usize)>,
    // Connection
    connected: bool,
    manual: bool,
    pending: bool,
    // Statement
    prepared: Option<String>,
    cursor: Option<Cursor>,
    affected: isize,
    bindings: BTreeMap<u16, Binding>,
}

impl Node {
    const fn new(kind: HandleKind, parent: Option<usize>) -> Self {
        Self {
            kind,
            parent,
            diagnostics: Vec::new(),
            version: None,
            listing: None,
            connected: false,
            manual: false,
            pending: false,
            prepared: None,
            cursor: None,
            affected: -1,
            bindings: BTreeMap::new(),
        }
    }
}

type Outcome<T = ()> = Result<T, Failure>;

/// A failed call: the code plus the record to attach.
#[derive(Debug)]
struct Failure {
    code: SqlReturn,
    record: Option<DiagnosticRecord>,
}

fn failure(state: &str, message: &str) -> Failure {
    Failure {
        code: SqlReturn::ERROR,
        record: Some(record(state, message)),
    }
}

fn invalid_handle() -> Failure {
    Failure {
        code: SqlReturn::INVALID_HANDLE,
        record: None,
    }
}

fn record(state: &str, message: &str) -> DiagnosticRecord {
    let state = SqlState::parse(state).unwrap_or_else(|| SqlState::from_bytes(*b"HY000"));
    DiagnosticRecord::new(state, 0, format!("[MockDriver] {message}"))
}

const TRUNCATED: &str = "01004";
const TRUNCATED_MESSAGE: &str = "String data, right truncated";

#[derive(Debug)]
struct State {
    next_id: usize,
    nodes: HashMap<usize, Node>,
    freed: Vec<HandleKind>,
    calls: Vec<MockFunction>,
    scripts: HashMap<MockFunction, VecDeque<Script>>,
    data_sources: Vec<DataSource>,
    drivers: Vec<(String, Vec<(String, String)>)>,
    queries: HashMap<String, MockResponse>,
    tables: Vec<(String, String, String)>,
    declared_version: Option<AttrOdbcVersion>,
    commits: usize,
    rollbacks: usize,
    last_parameters: Vec<(u16, MockValue)>,
    no_total: bool,
    message_limit: Option<usize>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            next_id: 0x1000,
            nodes: HashMap::new(),
            freed: Vec::new(),
            calls: Vec::new(),
            scripts: HashMap::new(),
            data_sources: Vec::new(),
            drivers: Vec::new(),
            queries: HashMap::new(),
            tables: Vec::new(),
            declared_version: None,
            commits: 0,
            rollbacks: 0,
            last_parameters: Vec::new(),
            no_total: false,
            message_limit: None,
        }
    }
}

/// In-memory [`NativeApi`] implementation. Clones share state, so a test
/// keeps one clone for setup and inspection while the context owns another.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<State>>,
}

impl fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockDriver")
            .field("live_handles", &state.nodes.len())
            .field("calls", &state.calls.len())
            .finish_non_exhaustive()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Setup
    // ═══════════════════════════════════════════════════════════════════════

    /// Registers a user data source accepting exactly these credentials.
    pub fn add_data_source(&self, name: &str, description: &str, user: &str, password: &str) {
        self.state.lock().data_sources.push(DataSource {
            name: name.to_string(),
            description: description.to_string(),
            user: Some(user.to_string()),
            password: Some(password.to_string()),
            scope: Scope::User,
        });
    }

    /// Registers a system data source accepting any credentials.
    pub fn add_system_data_source(&self, name: &str, description: &str) {
        self.state.lock().data_sources.push(DataSource {
            name: name.to_string(),
            description: description.to_string(),
            user: None,
            password: None,
            scope: Scope::System,
        });
    }

    pub fn add_driver(&self, description: &str, attributes: &[(&str, &str)]) {
        let attributes = attributes
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        self.state
            .lock()
            .drivers
            .push((description.to_string(), attributes));
    }

    /// Registers a table reported by `SQLTables`.
    pub fn add_table(&self, schema: &str, name: &str, table_type: &str) {
        self.state.lock().tables.push((
            schema.to_string(),
            name.to_string(),
            table_type.to_string(),
        ));
    }

    /// Registers the response to a statement text. Unregistered texts fail
    /// with `42000`.
    pub fn on_query(&self, sql: &str, response: MockResponse) {
        self.state.lock().queries.insert(sql.to_string(), response);
    }

    /// Report `SQL_NO_TOTAL` instead of the remaining length on truncated
    /// `SQLGetData` chunks.
    pub fn report_no_total(&self, enabled: bool) {
        self.state.lock().no_total = enabled;
    }

    /// Cut diagnostic messages to `limit` bytes regardless of the buffer.
    pub fn limit_messages(&self, limit: Option<usize>) {
        self.state.lock().message_limit = limit;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Scripting
    // ═══════════════════════════════════════════════════════════════════════

    /// The next call of `function` fails with `record`.
    pub fn fail_next(&self, function: MockFunction, record: DiagnosticRecord) {
        self.fail_next_with(function, vec![record]);
    }

    /// The next call of `function` fails with all of `records`.
    pub fn fail_next_with(&self, function: MockFunction, records: Vec<DiagnosticRecord>) {
        self.script(function, Script::Fail(records));
    }

    /// The next call of `function` succeeds with `record` attached.
    pub fn warn_next(&self, function: MockFunction, record: DiagnosticRecord) {
        self.script(function, Script::Warn(record));
    }

    /// The next call of `function` returns `code` and does nothing else.
    pub fn respond_next(&self, function: MockFunction, code: SqlReturn) {
        self.script(function, Script::Code(code));
    }

    /// The next `times` calls of `function` return `StillExecuting`.
    pub fn still_executing(&self, function: MockFunction, times: usize) {
        for _ in 0..times {
            self.script(function, Script::Code(SqlReturn::STILL_EXECUTING));
        }
    }

    fn script(&self, function: MockFunction, script: Script) {
        self.state
            .lock()
            .scripts
            .entry(function)
            .or_default()
            .push_back(script);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════════

    pub fn call_count(&self, function: MockFunction) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|&&call| call == function)
            .count()
    }

    pub fn calls(&self) -> Vec<MockFunction> {
        self.state.lock().calls.clone()
    }

    /// Handles allocated and not yet freed.
    pub fn live_handles(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Kinds of freed handles, in release order.
    pub fn freed_kinds(&self) -> Vec<HandleKind> {
        self.state.lock().freed.clone()
    }

    pub fn declared_version(&self) -> Option<AttrOdbcVersion> {
        self.state.lock().declared_version
    }

    pub fn is_connected(&self, handle: RawHandle) -> bool {
        self.state
            .lock()
            .nodes
            .get(&handle.addr())
            .is_some_and(|node| node.connected)
    }

    pub fn commits(&self) -> usize {
        self.state.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.state.lock().rollbacks
    }

    /// Input parameters read by the most recent execution.
    pub fn last_parameters(&self) -> Vec<(u16, MockValue)> {
        self.state.lock().last_parameters.clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Dispatch
    // ═══════════════════════════════════════════════════════════════════════

    /// Runs one native call: logs it, clears the handle's previous
    /// diagnostics, applies any script and stores the resulting records.
    fn dispatch(
        &self,
        function: MockFunction,
        handle: Option<RawHandle>,
        work: impl FnOnce(&mut State) -> Outcome<SqlReturn>,
    ) -> SqlReturn {
        let mut state = self.state.lock();
        state.calls.push(function);
        let id = handle.map(RawHandle::addr);
        if let Some(node) = id.and_then(|id| state.nodes.get_mut(&id)) {
            node.diagnostics.clear();
        }

        let script = state.scripts.get_mut(&function).and_then(VecDeque::pop_front);
        let (code, records) = match script {
            Some(Script::Code(code)) => (code, Vec::new()),
            Some(Script::Fail(records)) => (SqlReturn::ERROR, records),
            Some(Script::Warn(warning)) => match work(&mut *state) {
                Ok(SqlReturn::SUCCESS) => (SqlReturn::SUCCESS_WITH_INFO, vec![warning]),
                Ok(code) => (code, Vec::new()),
                Err(failure) => (failure.code, failure.record.into_iter().collect()),
            },
            None => match work(&mut *state) {
                Ok(code) => (code, Vec::new()),
                Err(failure) => (failure.code, failure.record.into_iter().collect()),
            },
        };

        if let Some(node) = id.and_then(|id| state.nodes.get_mut(&id)) {
            node.diagnostics.extend(records);
        }
        code
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Model
// ═══════════════════════════════════════════════════════════════════════════

impl State {
    fn node(&mut self, handle: RawHandle, kind: HandleKind) -> Outcome<&mut Node> {
        match self.nodes.get_mut(&handle.addr()) {
            Some(node) if node.kind == kind => Ok(node),
            _ => Err(invalid_handle()),
        }
    }

    /// Attaches a warning to `handle` and reports `SuccessWithInfo`.
    fn warn(&mut self, handle: RawHandle, state: &str, message: &str) -> SqlReturn {
        if let Some(node) = self.nodes.get_mut(&handle.addr()) {
            node.diagnostics.push(record(state, message));
        }
        SqlReturn::SUCCESS_WITH_INFO
    }

    fn connect(&mut self, dbc: RawHandle, dsn: &str, user: &str, password: &str) -> Outcome<SqlReturn> {
        if self.node(dbc, HandleKind::Connection)?.connected {
            return Err(failure("08002", "Connection name in use"));
        }
        let source = self
            .data_sources
            .iter()
            .find(|source| source.name.eq_ignore_ascii_case(dsn))
            .ok_or_else(|| {
                failure("IM002", "Data source name not found and no default driver specified")
            })?;
        let accepted = source.user.as_deref().is_none_or(|expected| expected == user)
            && source.password.as_deref().is_none_or(|expected| expected == password);
        if !accepted {
            return Err(failure("28000", "Invalid authorization specification"));
        }
        self.node(dbc, HandleKind::Connection)?.connected = true;
        Ok(SqlReturn::SUCCESS)
    }

    fn connection_of(&self, stmt: usize) -> Option<usize> {
        self.nodes.get(&stmt).and_then(|node| node.parent)
    }

    fn execute(&mut self, stmt: RawHandle, sql: &str) -> Outcome<SqlReturn> {
        let response = self
            .queries
            .get(sql)
            .cloned()
            .ok_or_else(|| failure("42000", "Syntax error or access violation"))?;

        let node = self.node(stmt, HandleKind::Statement)?;
        if node.cursor.is_some() {
            return Err(failure("24000", "Invalid cursor state"));
        }

        let mut inputs = Vec::new();
        for (&position, binding) in &node.bindings {
            if binding.direction != ParamDirection::Output {
                // SAFETY: the statement guarantees bound buffers stay valid
                // until re-bound, reset or the handle is freed.
                inputs.push((position, binding.c_type, unsafe { read_binding(binding) }));
            }
        }

        node.affected = -1;
        let manual_work = matches!(response, MockResponse::Affected(count) if count > 0);
        let code = match response {
            MockResponse::Rows { columns, rows } => {
                node.cursor = Some(Cursor::new(columns, rows));
                SqlReturn::SUCCESS
            }
            MockResponse::EchoParameters => {
                let columns = inputs
                    .iter()
                    .map(|(position, c_type, _)| {
                        MockColumn::new(&format!("p{position}"), data::echo_type(*c_type), 255, 0)
                    })
                    .collect();
                let row = inputs.iter().map(|(_, _, value)| value.clone()).collect();
                node.cursor = Some(Cursor::new(columns, vec![row]));
                SqlReturn::SUCCESS
            }
            MockResponse::Affected(count) => {
                node.affected = count;
                SqlReturn::SUCCESS
            }
            MockResponse::NoData => {
                node.affected = 0;
                SqlReturn::NO_DATA
            }
            MockResponse::Outputs(values) => {
                for (position, value) in values {
                    let Some(binding) = node.bindings.get(&position) else {
                        return Err(failure("07002", "COUNT field incorrect"));
                    };
                    let bytes = value
                        .to_c(binding.c_type)
                        .map_err(|(state, message)| failure(state, message))?;
                    // SAFETY: as for reading inputs above.
                    unsafe { write_binding(binding, bytes.as_deref()) };
                }
                node.affected = 0;
                SqlReturn::SUCCESS
            }
        };

        self.last_parameters = inputs
            .into_iter()
            .map(|(position, _, value)| (position, value))
            .collect();
        if manual_work
            && let Some(conn) = self
                .connection_of(stmt.addr())
                .and_then(|id| self.nodes.get_mut(&id))
            && conn.manual
        {
            conn.pending = true;
        }
        Ok(code)
    }

    fn end_transaction(&mut self, dbc: RawHandle, completion: CompletionType) -> Outcome<SqlReturn> {
        let node = self.node(dbc, HandleKind::Connection)?;
        if !node.connected {
            return Err(failure("08003", "Connection not open"));
        }
        node.pending = false;
        match completion {
            CompletionType::Commit => self.commits += 1,
            CompletionType::Rollback => self.rollbacks += 1,
        }
        Ok(SqlReturn::SUCCESS)
    }

    fn list_entry(
        &mut self,
        env: RawHandle,
        direction: FetchOrientation,
        entries: impl Fn(&Self, FetchOrientation) -> Vec<(Vec<u8>, Vec<u8>)>,
        first: &mut [u8],
        first_length: &mut i16,
        second: &mut [u8],
        second_length: &mut i16,
    ) -> Outcome<SqlReturn> {
        let node = self.node(env, HandleKind::Environment)?;
        let (scope, index) = match (direction, node.listing) {
            (FetchOrientation::Next, Some((scope, index))) => (scope, index + 1),
            (FetchOrientation::Next, None) => (FetchOrientation::First, 0),
            (start, _) => (start, 0),
        };
        node.listing = Some((scope, index));

        let entries = entries(self, scope);
        let Some((a, b)) = entries.get(index) else {
            return Ok(SqlReturn::NO_DATA);
        };
        let truncated = write_text(first, first_length, a) | write_text(second, second_length, b);
        if truncated {
            return Ok(self.warn(env, TRUNCATED, TRUNCATED_MESSAGE));
        }
        Ok(SqlReturn::SUCCESS)
    }

    fn data_source_entries(&self, scope: FetchOrientation) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data_sources
            .iter()
            .filter(|source| match scope {
                FetchOrientation::FirstUser => source.scope == Scope::User,
                FetchOrientation::FirstSystem => source.scope == Scope::System,
                FetchOrientation::First | FetchOrientation::Next => true,
            })
            .map(|source| (source.name.clone().into_bytes(), source.description.clone().into_bytes()))
            .collect()
    }

    fn driver_entries(&self, _scope: FetchOrientation) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.drivers
            .iter()
            .map(|(description, attributes)| {
                let mut list = Vec::new();
                for (key, value) in attributes {
                    list.extend_from_slice(key.as_bytes());
                    list.push(b'=');
                    list.extend_from_slice(value.as_bytes());
                    list.push(0);
                }
                (description.clone().into_bytes(), list)
            })
            .collect()
    }

    fn get_data(
        &mut self,
        stmt: RawHandle,
        column: u16,
        target: CDataType,
        buffer: &mut [u8],
        indicator: &mut isize,
    ) -> Outcome<SqlReturn> {
        let no_total = self.no_total;
        let node = self.node(stmt, HandleKind::Statement)?;
        let cursor = node
            .cursor
            .as_mut()
            .ok_or_else(|| failure("24000", "Invalid cursor state"))?;
        let row = cursor
            .current()
            .ok_or_else(|| failure("24000", "Invalid cursor state"))?;
        let value = column
            .checked_sub(1)
            .and_then(|index| row.get(usize::from(index)))
            .ok_or_else(|| failure("07009", "Invalid descriptor index"))?;
        if cursor.finished.contains(&column) {
            return Ok(SqlReturn::NO_DATA);
        }

        let Some(bytes) = value
            .to_c(target)
            .map_err(|(state, message)| failure(state, message))?
        else {
            *indicator = NULL_DATA;
            cursor.finished.insert(column);
            return Ok(SqlReturn::SUCCESS);
        };

        if let Some(size) = target.fixed_size() {
            buffer[..size].copy_from_slice(&bytes[..size]);
            *indicator = size as isize;
            cursor.finished.insert(column);
            return Ok(SqlReturn::SUCCESS);
        }

        let offset = cursor.offsets.get(&column).copied().unwrap_or(0);
        let remaining = &bytes[offset.min(bytes.len())..];
        let terminator = usize::from(target.is_nul_terminated());
        let usable = buffer.len().saturating_sub(terminator);
        let written = remaining.len().min(usable);
        buffer[..written].copy_from_slice(&remaining[..written]);
        if terminator == 1 && written < buffer.len() {
            buffer[written] = 0;
        }

        if remaining.len() > usable {
            *indicator = if no_total { NO_TOTAL } else { remaining.len() as isize };
            cursor.offsets.insert(column, offset + written);
            return Ok(self.warn(stmt, TRUNCATED, TRUNCATED_MESSAGE));
        }
        *indicator = remaining.len() as isize;
        cursor.finished.insert(column);
        Ok(SqlReturn::SUCCESS)
    }
}

/// Copies `text` into a NUL-terminated output buffer. Returns whether it
/// was cut short.
fn write_text(buffer: &mut [u8], length: &mut i16, text: &[u8]) -> bool {
    *length = i16::try_from(text.len()).unwrap_or(i16::MAX);
    let Some(capacity) = buffer.len().checked_sub(1) else {
        return !text.is_empty();
    };
    let written = text.len().min(capacity);
    buffer[..written].copy_from_slice(&text[..written]);
    buffer[written] = 0;
    text.len() > capacity
}

/// # Safety
///
/// The binding's pointers must be valid for their recorded lengths.
unsafe fn read_binding(binding: &Binding) -> MockValue {
    // SAFETY: guaranteed by the caller.
    let indicator = unsafe { *(binding.indicator as *const isize) };
    if indicator == NULL_DATA {
        return MockValue::Null;
    }
    let capacity = usize::try_from(binding.buffer_length).unwrap_or(0);
    let length = binding
            .c_type
            .fixed_size()
            .unwrap_or_else(|| usize::try_from(indicator).unwrap_or(capacity))
            .min(capacity);
    let bytes = if length == 0 {
        &[][..]
    } else {
        // SAFETY: guaranteed by the caller; `length` is within the buffer.
        unsafe { std::slice::from_raw_parts(binding.value as *const u8, length) }
    };
    MockValue::from_c(binding.c_type, bytes)
}

/// # Safety
///
/// The binding's pointers must be valid for writes of their recorded
/// lengths.
unsafe fn write_binding(binding: &Binding, bytes: Option<&[u8]>) {
    let indicator = binding.indicator as *mut isize;
    let Some(bytes) = bytes else {
        // SAFETY: guaranteed by the caller.
        unsafe { *indicator = NULL_DATA };
        return;
    };
    let capacity = usize::try_from(binding.buffer_length).unwrap_or(0);
    let terminator = usize::from(binding.c_type.is_nul_terminated());
    let written = bytes.len().min(capacity.saturating_sub(terminator));
    // SAFETY: guaranteed by the caller; at most `capacity` bytes are written.
    unsafe {
        let target = std::slice::from_raw_parts_mut(binding.value as *mut u8, capacity);
        target[..written].copy_from_slice(&bytes[..written]);
        if terminator == 1 && written < capacity {
            target[written] = 0;
        }
        *indicator = bytes.len() as isize;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// NativeApi
// ═══════════════════════════════════════════════════════════════════════════

impl NativeApi for MockDriver {
    fn alloc_handle(
        &self,
        kind: HandleKind,
        parent: Option<RawHandle>,
        output: &mut Option<RawHandle>,
    ) -> SqlReturn {
        self.dispatch(MockFunction::AllocHandle, parent, |state| {
            let parent_kind = match kind {
                HandleKind::Environment => None,
                HandleKind::Connection => Some(HandleKind::Environment),
                HandleKind::Statement | HandleKind::Descriptor => Some(HandleKind::Connection),
            };
            match (parent_kind, parent) {
                (None, None) => {}
                (Some(expected), Some(parent)) => {
                    let node = state.node(parent, expected)?;
                    if kind == HandleKind::Connection && node.version.is_none() {
                        return Err(failure("HY010", "Function sequence error"));
                    }
                    if kind == HandleKind::Statement && !node.connected {
                        return Err(failure("08003", "Connection not open"));
                    }
                }
                _ => return Err(invalid_handle()),
            }

            let id = state.next_id;
            state.next_id += 0x10;
            state.nodes.insert(id, Node::new(kind, parent.map(RawHandle::addr)));
            *output = Some(RawHandle::from_addr(id));
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn free_handle(&self, kind: HandleKind, handle: RawHandle) -> SqlReturn {
        self.dispatch(MockFunction::FreeHandle, Some(handle), |state| {
            let node = state.node(handle, kind)?;
            if node.connected {
                return Err(failure("HY010", "Function sequence error"));
            }
            let id = handle.addr();
            if state.nodes.values().any(|node| node.parent == Some(id)) {
                return Err(failure("HY010", "Function sequence error"));
            }
            state.nodes.remove(&id);
            state.freed.push(kind);
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn get_diag_rec(
        &self,
        kind: HandleKind,
        handle: RawHandle,
        record: i16,
        state: &mut [u8; 6],
        native_error: &mut i32,
        message: &mut [u8],
        text_length: &mut i16,
    ) -> SqlReturn {
        let mut guard = self.state.lock();
        guard.calls.push(MockFunction::GetDiagRec);
        let limit = guard.message_limit;
        let Some(node) = guard.nodes.get(&handle.addr()).filter(|node| node.kind == kind) else {
            return SqlReturn::INVALID_HANDLE;
        };
        let Some(index) = usize::try_from(record).ok().and_then(|r| r.checked_sub(1)) else {
            return SqlReturn::ERROR;
        };
        let Some(found) = node.diagnostics.get(index) else {
            return SqlReturn::NO_DATA;
        };

        state[..5].copy_from_slice(found.state.as_str().as_bytes());
        state[5] = 0;
        *native_error = found.native_error;
        let full = found.message.as_bytes();
        let text = limit.map_or(full, |limit| &full[..full.len().min(limit)]);
        let truncated = write_text(message, text_length, text);
        *text_length = i16::try_from(full.len()).unwrap_or(i16::MAX);
        if truncated || text.len() < full.len() {
            SqlReturn::SUCCESS_WITH_INFO
        } else {
            SqlReturn::SUCCESS
        }
    }

    fn set_odbc_version(&self, env: RawHandle, version: AttrOdbcVersion) -> SqlReturn {
        self.dispatch(MockFunction::SetEnvAttr, Some(env), |state| {
            state.node(env, HandleKind::Environment)?.version = Some(version);
            state.declared_version = Some(version);
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn data_sources(
        &self,
        env: RawHandle,
        direction: FetchOrientation,
        server_name: &mut [u8],
        server_name_length: &mut i16,
        description: &mut [u8],
        description_length: &mut i16,
    ) -> SqlReturn {
        self.dispatch(MockFunction::DataSources, Some(env), |state| {
            state.list_entry(
                env,
                direction,
                State::data_source_entries,
                server_name,
                server_name_length,
                description,
                description_length,
            )
        })
    }

    fn drivers(
        &self,
        env: RawHandle,
        direction: FetchOrientation,
        description: &mut [u8],
        description_length: &mut i16,
        attributes: &mut [u8],
        attributes_length: &mut i16,
    ) -> SqlReturn {
        self.dispatch(MockFunction::Drivers, Some(env), |state| {
            state.list_entry(
                env,
                direction,
                State::driver_entries,
                description,
                description_length,
                attributes,
                attributes_length,
            )
        })
    }

    fn connect(&self, dbc: RawHandle, dsn: &[u8], user: &[u8], password: &[u8]) -> SqlReturn {
        self.dispatch(MockFunction::Connect, Some(dbc), |state| {
            state.connect(
                dbc,
                &String::from_utf8_lossy(dsn),
                &String::from_utf8_lossy(user),
                &String::from_utf8_lossy(password),
            )
        })
    }

    fn driver_connect(&self, dbc: RawHandle, connection_string: &[u8]) -> SqlReturn {
        self.dispatch(MockFunction::DriverConnect, Some(dbc), |state| {
            let text = String::from_utf8_lossy(connection_string);
            let attributes: HashMap<String, String> = text
                .split(';')
                .filter_map(|pair| pair.split_once('='))
                .map(|(key, value)| (key.trim().to_ascii_uppercase(), value.trim().to_string()))
                .collect();
            let field = |key: &str| attributes.get(key).map_or("", String::as_str);
            let Some(dsn) = attributes.get("DSN") else {
                return Err(failure(
                    "IM002",
                    "Data source name not found and no default driver specified",
                ));
            };
            state.connect(dbc, dsn, field("UID"), field("PWD"))
        })
    }

    fn disconnect(&self, dbc: RawHandle) -> SqlReturn {
        self.dispatch(MockFunction::Disconnect, Some(dbc), |state| {
            let node = state.node(dbc, HandleKind::Connection)?;
            if !node.connected {
                return Err(failure("08003", "Connection not open"));
            }
            if node.manual && node.pending {
                return Err(failure("25000", "Invalid transaction state"));
            }
            node.connected = false;
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn set_autocommit(&self, dbc: RawHandle, enabled: bool) -> SqlReturn {
        self.dispatch(MockFunction::SetConnectAttr, Some(dbc), |state| {
            let node = state.node(dbc, HandleKind::Connection)?;
            let commit = enabled && node.pending;
            node.manual = !enabled;
            node.pending = false;
            if commit {
                state.commits += 1;
            }
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn end_tran(&self, dbc: RawHandle, completion: CompletionType) -> SqlReturn {
        self.dispatch(MockFunction::EndTran, Some(dbc), |state| {
            state.end_transaction(dbc, completion)
        })
    }

    fn prepare(&self, stmt: RawHandle, text: &[u8]) -> SqlReturn {
        self.dispatch(MockFunction::Prepare, Some(stmt), |state| {
            let sql = String::from_utf8_lossy(text).into_owned();
            if !state.queries.contains_key(&sql) {
                return Err(failure("42000", "Syntax error or access violation"));
            }
            state.node(stmt, HandleKind::Statement)?.prepared = Some(sql);
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn exec_direct(&self, stmt: RawHandle, text: &[u8]) -> SqlReturn {
        self.dispatch(MockFunction::ExecDirect, Some(stmt), |state| {
            state.execute(stmt, &String::from_utf8_lossy(text))
        })
    }

    fn execute(&self, stmt: RawHandle) -> SqlReturn {
        self.dispatch(MockFunction::Execute, Some(stmt), |state| {
            let sql = state
                .node(stmt, HandleKind::Statement)?
                .prepared
                .clone()
                .ok_or_else(|| failure("HY010", "Function sequence error"))?;
            state.execute(stmt, &sql)
        })
    }

    fn num_result_cols(&self, stmt: RawHandle, count: &mut i16) -> SqlReturn {
        self.dispatch(MockFunction::NumResultCols, Some(stmt), |state| {
            let node = state.node(stmt, HandleKind::Statement)?;
            *count = node
                .cursor
                .as_ref()
                .map_or(0, |cursor| i16::try_from(cursor.columns.len()).unwrap_or(i16::MAX));
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn row_count(&self, stmt: RawHandle, count: &mut isize) -> SqlReturn {
        self.dispatch(MockFunction::RowCount, Some(stmt), |state| {
            *count = state.node(stmt, HandleKind::Statement)?.affected;
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn describe_col(
        &self,
        stmt: RawHandle,
        column: u16,
        name: &mut [u8],
        name_length: &mut i16,
        data_type: &mut i16,
        column_size: &mut usize,
        decimal_digits: &mut i16,
        nullable: &mut i16,
    ) -> SqlReturn {
        self.dispatch(MockFunction::DescribeCol, Some(stmt), |state| {
            let node = state.node(stmt, HandleKind::Statement)?;
            let cursor = node
                .cursor
                .as_ref()
                .ok_or_else(|| failure("07005", "Prepared statement not a cursor-specification"))?;
            let described = column
                .checked_sub(1)
                .and_then(|index| cursor.columns.get(usize::from(index)))
                .ok_or_else(|| failure("07009", "Invalid descriptor index"))?;

            *data_type = described.data_type.raw();
            *column_size = described.column_size;
            *decimal_digits = described.decimal_digits;
            *nullable = described.nullable.raw();
            let truncated = write_text(name, name_length, described.name.as_bytes());
            if truncated {
                return Ok(state.warn(stmt, TRUNCATED, TRUNCATED_MESSAGE));
            }
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn tables(
        &self,
        stmt: RawHandle,
        catalog: Option<&[u8]>,
        schema: Option<&[u8]>,
        table: Option<&[u8]>,
        table_type: Option<&[u8]>,
    ) -> SqlReturn {
        self.dispatch(MockFunction::Tables, Some(stmt), |state| {
            let matches = |filter: Option<&[u8]>, value: &str| {
                filter.is_none_or(|filter| {
                    let filter = String::from_utf8_lossy(filter);
                    filter == "%"
                        || filter
                            .split(',')
                            .any(|item| item.trim().trim_matches('\'').eq_ignore_ascii_case(value))
                })
            };
            let rows: Vec<Vec<MockValue>> = state
                .tables
                .iter()
                .filter(|(table_schema, name, kind)| {
                    matches(schema, table_schema) && matches(table, name) && matches(table_type, kind)
                })
                .map(|(table_schema, name, kind)| {
                    vec![
                        catalog.map_or(MockValue::Null, |c| {
                            MockValue::text(String::from_utf8_lossy(c))
                        }),
                        MockValue::text(table_schema.clone()),
                        MockValue::text(name.clone()),
                        MockValue::text(kind.clone()),
                        MockValue::Null,
                    ]
                })
                .collect();
            let columns = vec![
                MockColumn::varchar("TABLE_CAT", 128),
                MockColumn::varchar("TABLE_SCHEM", 128),
                MockColumn::varchar("TABLE_NAME", 128).not_null(),
                MockColumn::varchar("TABLE_TYPE", 128),
                MockColumn::varchar("REMARKS", 254),
            ];

            let node = state.node(stmt, HandleKind::Statement)?;
            if node.cursor.is_some() {
                return Err(failure("24000", "Invalid cursor state"));
            }
            node.cursor = Some(Cursor::new(columns, rows));
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn fetch(&self, stmt: RawHandle) -> SqlReturn {
        self.dispatch(MockFunction::Fetch, Some(stmt), |state| {
            let node = state.node(stmt, HandleKind::Statement)?;
            let cursor = node
                .cursor
                .as_mut()
                .ok_or_else(|| failure("24000", "Invalid cursor state"))?;
            let next = cursor.position.map_or(0, |row| row + 1).min(cursor.rows.len());
            cursor.position = Some(next);
            cursor.offsets.clear();
            cursor.finished.clear();
            if next == cursor.rows.len() {
                return Ok(SqlReturn::NO_DATA);
            }
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn get_data(
        &self,
        stmt: RawHandle,
        column: u16,
        target: CDataType,
        buffer: &mut [u8],
        indicator: &mut isize,
    ) -> SqlReturn {
        self.dispatch(MockFunction::GetData, Some(stmt), |state| {
            state.get_data(stmt, column, target, buffer, indicator)
        })
    }

    unsafe fn bind_parameter(
        &self,
        stmt: RawHandle,
        position: u16,
        direction: ParamDirection,
        value_type: CDataType,
        parameter_type: SqlDataType,
        _column_size: usize,
        _decimal_digits: i16,
        value: *mut u8,
        buffer_length: isize,
        indicator: *mut isize,
    ) -> SqlReturn {
        self.dispatch(MockFunction::BindParameter, Some(stmt), |state| {
            if position == 0 {
                return Err(failure("07009", "Invalid descriptor index"));
            }
            if parameter_type == SqlDataType::Unknown {
                return Err(failure("HY004", "Invalid SQL data type"));
            }
            state.node(stmt, HandleKind::Statement)?.bindings.insert(
                position,
                Binding {
                    direction,
                    c_type: value_type,
                    value: value as usize,
                    buffer_length,
                    indicator: indicator as usize,
                },
            );
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn close_cursor(&self, stmt: RawHandle) -> SqlReturn {
        self.dispatch(MockFunction::CloseCursor, Some(stmt), |state| {
            let node = state.node(stmt, HandleKind::Statement)?;
            if node.cursor.take().is_none() {
                return Err(failure("24000", "Invalid cursor state"));
            }
            Ok(SqlReturn::SUCCESS)
        })
    }

    fn free_stmt(&self, stmt: RawHandle, option: FreeStmtOption) -> SqlReturn {
        self.dispatch(MockFunction::FreeStmt, Some(stmt), |state| {
            let node = state.node(stmt, HandleKind::Statement)?;
            match option {
                FreeStmtOption::Close => node.cursor = None,
                FreeStmtOption::Unbind => {}
                FreeStmtOption::ResetParams => node.bindings.clear(),
            }
            Ok(SqlReturn::SUCCESS)
        })
    }
}
