use arrow_flight::sql::{
    CommandGetCatalogs, CommandGetDbSchemas, CommandGetExportedKeys, CommandGetImportedKeys,
    CommandGetPrimaryKeys, CommandGetTableTypes, CommandGetTables,
};
use arrow_flight::Ticket;
use flightline_common::{Error, Result, Settings};
use flightline_transport::FlightSession;
use tracing::debug;

use crate::command::{PreparedStatementHandle, SqlCommand};
use crate::metadata::{self, DbSchema, ForeignKey, MetadataRow, PrimaryKey, TableInfo};
use crate::result::QueryResult;

/// Where `get_flight_info` says a command's data lives.
enum Location {
    Ticket(Ticket),
    NoEndpoint,
    NoTicket,
}

/// Flight SQL client over one [`FlightSession`].
///
/// Every method returns either its documented result or one typed [`Error`]. Errors
/// that do not already carry a specific kind are wrapped into [`Error::SqlCommand`].
pub struct FlightSqlClient {
    session: FlightSession,
}

impl FlightSqlClient {
    pub fn new(settings: Settings) -> Result<Self> {
        Ok(Self::from_session(FlightSession::new(settings)?))
    }

    pub fn from_session(session: FlightSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &FlightSession {
        &self.session
    }

    pub async fn close(&self) {
        self.session.close().await;
    }

    /// Runs an ad-hoc SQL statement.
    pub async fn execute(&self, query: &str) -> Result<QueryResult> {
        debug!(query, "execute");
        self.query(SqlCommand::statement_query(query))
            .await
            .map_err(Error::into_command_error)
    }

    pub async fn execute_prepared(&self, handle: &PreparedStatementHandle) -> Result<QueryResult> {
        debug!(handle_len = handle.as_bytes().len(), "execute_prepared");
        self.query(SqlCommand::prepared_statement_query(handle))
            .await
            .map_err(Error::into_command_error)
    }

    pub async fn get_catalogs(&self) -> Result<Vec<String>> {
        self.metadata_strings(SqlCommand::GetCatalogs(CommandGetCatalogs {}), "catalog_name")
            .await
    }

    pub async fn get_db_schemas(
        &self,
        catalog: Option<&str>,
        db_schema_filter_pattern: Option<&str>,
    ) -> Result<Vec<DbSchema>> {
        self.metadata_rows(SqlCommand::GetDbSchemas(CommandGetDbSchemas {
            catalog: catalog.map(str::to_string),
            db_schema_filter_pattern: db_schema_filter_pattern.map(str::to_string),
        }))
        .await
    }

    /// Lists tables. An empty `table_types` slice matches every type.
    pub async fn get_tables(
        &self,
        catalog: Option<&str>,
        db_schema_filter_pattern: Option<&str>,
        table_name_filter_pattern: Option<&str>,
        table_types: &[&str],
    ) -> Result<Vec<TableInfo>> {
        self.metadata_rows(SqlCommand::GetTables(CommandGetTables {
            catalog: catalog.map(str::to_string),
            db_schema_filter_pattern: db_schema_filter_pattern.map(str::to_string),
            table_name_filter_pattern: table_name_filter_pattern.map(str::to_string),
            table_types: table_types.iter().map(|t| t.to_string()).collect(),
            include_schema: false,
        }))
        .await
    }

    pub async fn get_table_types(&self) -> Result<Vec<String>> {
        self.metadata_strings(SqlCommand::GetTableTypes(CommandGetTableTypes {}), "table_type")
            .await
    }

    pub async fn get_primary_keys(
        &self,
        catalog: Option<&str>,
        db_schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<PrimaryKey>> {
        self.metadata_rows(SqlCommand::GetPrimaryKeys(CommandGetPrimaryKeys {
            catalog: catalog.map(str::to_string),
            db_schema: db_schema.map(str::to_string),
            table: table.to_string(),
        }))
        .await
    }

    /// Foreign keys of `table` that reference other tables' primary keys.
    pub async fn get_imported_keys(
        &self,
        catalog: Option<&str>,
        db_schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ForeignKey>> {
        self.metadata_rows(SqlCommand::GetImportedKeys(CommandGetImportedKeys {
            catalog: catalog.map(str::to_string),
            db_schema: db_schema.map(str::to_string),
            table: table.to_string(),
        }))
        .await
    }

    /// Foreign keys in other tables that reference the primary key of `table`.
    pub async fn get_exported_keys(
        &self,
        catalog: Option<&str>,
        db_schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ForeignKey>> {
        self.metadata_rows(SqlCommand::GetExportedKeys(CommandGetExportedKeys {
            catalog: catalog.map(str::to_string),
            db_schema: db_schema.map(str::to_string),
            table: table.to_string(),
        }))
        .await
    }

    /// Creates a server-side prepared statement. The handle is the body of the first
    /// action result.
    pub async fn prepare(&self, query: &str) -> Result<PreparedStatementHandle> {
        debug!(query, "prepare");
        async {
            let action = SqlCommand::create_prepared_statement(query).to_action()?;
            let first = self
                .session
                .do_action(action)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    Error::Protocol("create prepared statement returned no results".to_string())
                })?;
            Ok::<_, Error>(PreparedStatementHandle::new(first.body))
        }
        .await
        .map_err(Error::into_command_error)
    }

    /// Releases a prepared statement. The handle is consumed.
    pub async fn close_prepared(&self, handle: PreparedStatementHandle) -> Result<()> {
        debug!(handle_len = handle.as_bytes().len(), "close_prepared");
        async {
            let action = SqlCommand::close_prepared_statement(&handle).to_action()?;
            self.session.do_action(action).await?;
            Ok::<_, Error>(())
        }
        .await
        .map_err(Error::into_command_error)
    }

    async fn locate(&self, command: &SqlCommand) -> Result<Location> {
        let info = self.session.get_flight_info(command.to_descriptor()?).await?;
        let Some(endpoint) = info.endpoint.into_iter().next() else {
            return Ok(Location::NoEndpoint);
        };
        Ok(match endpoint.ticket {
            Some(ticket) => Location::Ticket(ticket),
            None => Location::NoTicket,
        })
    }

    async fn fetch(&self, ticket: Ticket) -> Result<QueryResult> {
        let stream = self.session.do_get(ticket).await?;
        QueryResult::decode(&stream)
    }

    async fn query(&self, command: SqlCommand) -> Result<QueryResult> {
        match self.locate(&command).await? {
            Location::Ticket(ticket) => self.fetch(ticket).await,
            Location::NoEndpoint => Err(Error::Protocol(format!(
                "no endpoints returned for {:?}",
                command.kind()
            ))),
            Location::NoTicket => Err(Error::Protocol(format!(
                "endpoint for {:?} carries no ticket",
                command.kind()
            ))),
        }
    }

    /// Like [`Self::query`], but a missing endpoint or ticket is an empty result.
    async fn metadata(&self, command: SqlCommand) -> Result<QueryResult> {
        debug!(command = ?command.kind(), "metadata");
        match self.locate(&command).await? {
            Location::Ticket(ticket) => self.fetch(ticket).await,
            Location::NoEndpoint | Location::NoTicket => {
                debug!(command = ?command.kind(), "no data location, returning empty result");
                Ok(QueryResult::default())
            }
        }
    }

    async fn metadata_strings(
        &self,
        command: SqlCommand,
        column: &'static str,
    ) -> Result<Vec<String>> {
        async { metadata::string_values(&self.metadata(command).await?, column) }
            .await
            .map_err(Error::into_command_error)
    }

    async fn metadata_rows<R: MetadataRow>(&self, command: SqlCommand) -> Result<Vec<R>> {
        async { R::from_result(&self.metadata(command).await?) }
            .await
            .map_err(Error::into_command_error)
    }
}
