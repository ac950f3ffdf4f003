//! Flight SQL command shapes and their type-tagged envelopes.
//!
//! Every command travels as a protobuf `Any`: a stable type URL naming the message
//! and the encoded message itself. Query and metadata commands are embedded in a
//! CMD [`FlightDescriptor`]; the prepared statement lifecycle uses [`Action`]s.

use arrow_flight::sql::{
    ActionClosePreparedStatementRequest, ActionCreatePreparedStatementRequest, Any,
    CommandGetCatalogs, CommandGetDbSchemas, CommandGetExportedKeys, CommandGetImportedKeys,
    CommandGetPrimaryKeys, CommandGetTableTypes, CommandGetTables, CommandPreparedStatementQuery,
    CommandStatementQuery, ProstMessageExt,
};
use arrow_flight::{Action, FlightDescriptor};
use flightline_common::{Error, Result};
use prost::bytes::Bytes;
use prost::Message;

pub const CREATE_PREPARED_STATEMENT: &str = "CreatePreparedStatement";
pub const CLOSE_PREPARED_STATEMENT: &str = "ClosePreparedStatement";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    StatementQuery,
    PreparedStatementQuery,
    GetCatalogs,
    GetDbSchemas,
    GetTables,
    GetTableTypes,
    GetPrimaryKeys,
    GetImportedKeys,
    GetExportedKeys,
    CreatePreparedStatement,
    ClosePreparedStatement,
}

impl CommandKind {
    pub const ALL: [CommandKind; 11] = [
        CommandKind::StatementQuery,
        CommandKind::PreparedStatementQuery,
        CommandKind::GetCatalogs,
        CommandKind::GetDbSchemas,
        CommandKind::GetTables,
        CommandKind::GetTableTypes,
        CommandKind::GetPrimaryKeys,
        CommandKind::GetImportedKeys,
        CommandKind::GetExportedKeys,
        CommandKind::CreatePreparedStatement,
        CommandKind::ClosePreparedStatement,
    ];

    pub fn type_url(self) -> &'static str {
        match self {
            CommandKind::StatementQuery => CommandStatementQuery::type_url(),
            CommandKind::PreparedStatementQuery => CommandPreparedStatementQuery::type_url(),
            CommandKind::GetCatalogs => CommandGetCatalogs::type_url(),
            CommandKind::GetDbSchemas => CommandGetDbSchemas::type_url(),
            CommandKind::GetTables => CommandGetTables::type_url(),
            CommandKind::GetTableTypes => CommandGetTableTypes::type_url(),
            CommandKind::GetPrimaryKeys => CommandGetPrimaryKeys::type_url(),
            CommandKind::GetImportedKeys => CommandGetImportedKeys::type_url(),
            CommandKind::GetExportedKeys => CommandGetExportedKeys::type_url(),
            CommandKind::CreatePreparedStatement => ActionCreatePreparedStatementRequest::type_url(),
            CommandKind::ClosePreparedStatement => ActionClosePreparedStatementRequest::type_url(),
        }
    }

    pub fn from_type_url(type_url: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_url() == type_url)
    }

    /// Action type name for the commands sent through do-action.
    pub fn action_type(self) -> Option<&'static str> {
        match self {
            CommandKind::CreatePreparedStatement => Some(CREATE_PREPARED_STATEMENT),
            CommandKind::ClosePreparedStatement => Some(CLOSE_PREPARED_STATEMENT),
            _ => None,
        }
    }
}

/// Type URL plus opaque payload. The payload is never inspected here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub type_url: String,
    pub payload: Bytes,
}

impl CommandEnvelope {
    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::from_type_url(&self.type_url)
    }

    pub fn encode(&self) -> Bytes {
        Any {
            type_url: self.type_url.clone(),
            value: self.payload.clone(),
        }
        .encode_to_vec()
        .into()
    }

    /// Decodes an envelope and checks that it names a known command.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let any = Any::decode(bytes)
            .map_err(|e| Error::Protocol(format!("malformed command envelope: {e}")))?;
        let envelope = Self {
            type_url: any.type_url,
            payload: any.value,
        };
        if envelope.kind().is_none() {
            return Err(Error::Protocol(format!(
                "unknown command type {}",
                envelope.type_url
            )));
        }
        Ok(envelope)
    }
}

/// Opaque reference to a server-side prepared statement.
///
/// Not `Clone`: [`crate::FlightSqlClient::close_prepared`] takes it by value, so a
/// closed handle cannot be used again.
#[derive(Debug, PartialEq, Eq)]
pub struct PreparedStatementHandle(Bytes);

impl PreparedStatementHandle {
    pub fn new(handle: impl Into<Bytes>) -> Self {
        Self(handle.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlCommand {
    StatementQuery(CommandStatementQuery),
    PreparedStatementQuery(CommandPreparedStatementQuery),
    GetCatalogs(CommandGetCatalogs),
    GetDbSchemas(CommandGetDbSchemas),
    GetTables(CommandGetTables),
    GetTableTypes(CommandGetTableTypes),
    GetPrimaryKeys(CommandGetPrimaryKeys),
    GetImportedKeys(CommandGetImportedKeys),
    GetExportedKeys(CommandGetExportedKeys),
    CreatePreparedStatement(ActionCreatePreparedStatementRequest),
    ClosePreparedStatement(ActionClosePreparedStatementRequest),
}

impl SqlCommand {
    pub fn statement_query(query: impl Into<String>) -> Self {
        SqlCommand::StatementQuery(CommandStatementQuery {
            query: query.into(),
            transaction_id: None,
        })
    }

    pub fn prepared_statement_query(handle: &PreparedStatementHandle) -> Self {
        SqlCommand::PreparedStatementQuery(CommandPreparedStatementQuery {
            prepared_statement_handle: handle.to_bytes(),
        })
    }

    pub fn create_prepared_statement(query: impl Into<String>) -> Self {
        SqlCommand::CreatePreparedStatement(ActionCreatePreparedStatementRequest {
            query: query.into(),
            transaction_id: None,
        })
    }

    pub fn close_prepared_statement(handle: &PreparedStatementHandle) -> Self {
        SqlCommand::ClosePreparedStatement(ActionClosePreparedStatementRequest {
            prepared_statement_handle: handle.to_bytes(),
        })
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            SqlCommand::StatementQuery(_) => CommandKind::StatementQuery,
            SqlCommand::PreparedStatementQuery(_) => CommandKind::PreparedStatementQuery,
            SqlCommand::GetCatalogs(_) => CommandKind::GetCatalogs,
            SqlCommand::GetDbSchemas(_) => CommandKind::GetDbSchemas,
            SqlCommand::GetTables(_) => CommandKind::GetTables,
            SqlCommand::GetTableTypes(_) => CommandKind::GetTableTypes,
            SqlCommand::GetPrimaryKeys(_) => CommandKind::GetPrimaryKeys,
            SqlCommand::GetImportedKeys(_) => CommandKind::GetImportedKeys,
            SqlCommand::GetExportedKeys(_) => CommandKind::GetExportedKeys,
            SqlCommand::CreatePreparedStatement(_) => CommandKind::CreatePreparedStatement,
            SqlCommand::ClosePreparedStatement(_) => CommandKind::ClosePreparedStatement,
        }
    }

    pub fn envelope(&self) -> CommandEnvelope {
        let any = match self {
            SqlCommand::StatementQuery(cmd) => cmd.as_any(),
            SqlCommand::PreparedStatementQuery(cmd) => cmd.as_any(),
            SqlCommand::GetCatalogs(cmd) => cmd.as_any(),
            SqlCommand::GetDbSchemas(cmd) => cmd.as_any(),
            SqlCommand::GetTables(cmd) => cmd.as_any(),
            SqlCommand::GetTableTypes(cmd) => cmd.as_any(),
            SqlCommand::GetPrimaryKeys(cmd) => cmd.as_any(),
            SqlCommand::GetImportedKeys(cmd) => cmd.as_any(),
            SqlCommand::GetExportedKeys(cmd) => cmd.as_any(),
            SqlCommand::CreatePreparedStatement(cmd) => cmd.as_any(),
            SqlCommand::ClosePreparedStatement(cmd) => cmd.as_any(),
        };
        CommandEnvelope {
            type_url: any.type_url,
            payload: any.value,
        }
    }

    /// CMD descriptor for query and metadata commands.
    pub fn to_descriptor(&self) -> Result<FlightDescriptor> {
        let kind = self.kind();
        if kind.action_type().is_some() {
            return Err(Error::SqlCommand(format!(
                "{kind:?} is an action, not a descriptor command"
            )));
        }
        Ok(FlightDescriptor::new_cmd(self.envelope().encode()))
    }

    /// do-action request for the prepared statement lifecycle commands.
    pub fn to_action(&self) -> Result<Action> {
        let kind = self.kind();
        let action_type = kind.action_type().ok_or_else(|| {
            Error::SqlCommand(format!("{kind:?} is a descriptor command, not an action"))
        })?;
        Ok(Action::new(action_type, self.envelope().encode()))
    }
}
