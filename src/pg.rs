//! PostgreSQL implementation of the collaborator traits.

use itertools::Itertools;
use log::debug;
use postgres::{CopyInWriter, GenericClient, types::ToSql};

use crate::{
    db::{CopySink, CreatedTable, Database, NewTable, ProcArg, TableCreator},
    error::DbError,
    identifier::{qualify, quote_ident, quote_literal},
};

/// Schema holding the server-side alteration procedures.
pub const DEFAULT_PROCEDURE_SCHEMA: &str = "msar";

/// Name of the surrogate key every import table is created with.
pub const ID_COLUMN: &str = "id";

/// Runs procedures, bulk loads and table creation over one borrowed
/// client or transaction.
pub struct PgSession<'a, C: GenericClient> {
    client: &'a mut C,
    procedure_schema: String,
}

impl<'a, C: GenericClient> PgSession<'a, C> {
    pub fn new(client: &'a mut C) -> Self {
        Self {
            client,
            procedure_schema: DEFAULT_PROCEDURE_SCHEMA.to_string(),
        }
    }

    pub fn with_procedure_schema(mut self, schema: impl Into<String>) -> Self {
        self.procedure_schema = schema.into();
        self
    }
}

fn as_sql(arg: &ProcArg) -> &(dyn ToSql + Sync) {
    match arg {
        ProcArg::Oid(value) => value,
        ProcArg::Int(value) => value,
        ProcArg::Text(value) => value,
        ProcArg::Json(value) => value,
    }
}

impl<C: GenericClient> Database for PgSession<'_, C> {
    fn call_procedure(
        &mut self,
        function: &str,
        args: &[ProcArg],
    ) -> Result<Option<String>, DbError> {
        let qualified = qualify(&self.procedure_schema, function)?;
        let placeholders = args
            .iter()
            .enumerate()
            .map(|(idx, arg)| format!("${}::{}", idx + 1, arg.sql_type()))
            .join(", ");
        let statement = format!("SELECT {qualified}({placeholders})::text");
        debug!("Calling {statement}");
        let params = args.iter().map(as_sql).collect::<Vec<_>>();
        let row = self.client.query_one(statement.as_str(), &params)?;
        Ok(row.try_get::<_, Option<String>>(0)?)
    }

    fn copy_in(&mut self, command: &str) -> Result<Box<dyn CopySink + '_>, DbError> {
        debug!("Opening bulk load: {command}");
        let writer = self.client.copy_in(command)?;
        Ok(Box::new(writer))
    }
}

impl CopySink for CopyInWriter<'_> {
    fn finish(self: Box<Self>) -> Result<u64, DbError> {
        Ok((*self).finish()?)
    }
}

impl<C: GenericClient> TableCreator for PgSession<'_, C> {
    fn create_table(&mut self, table: &NewTable<'_>) -> Result<CreatedTable, DbError> {
        let qualified = qualify(table.schema, table.name)?;
        let mut definitions = vec![format!(
            "{} integer PRIMARY KEY GENERATED ALWAYS AS IDENTITY",
            quote_ident(ID_COLUMN)?
        )];
        for column in table.columns {
            definitions.push(format!("{} text", quote_ident(column)?));
        }
        let create = format!("CREATE TABLE {qualified} ({})", definitions.join(", "));
        debug!("Creating table: {create}");
        self.client.batch_execute(&create)?;
        if let Some(comment) = table.comment {
            self.client.batch_execute(&format!(
                "COMMENT ON TABLE {qualified} IS {}",
                quote_literal(comment)
            ))?;
        }
        let row = self
            .client
            .query_one("SELECT $1::text::regclass::oid", &[&qualified])?;
        Ok(CreatedTable {
            oid: row.try_get(0)?,
            schema: table.schema.to_string(),
            name: table.name.to_string(),
        })
    }
}
