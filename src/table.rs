use std::path::Path;

use anyhow::{Context, anyhow, bail};
use duckdb::Connection;

/// Storage class of a source column, as reported by DuckDB's type sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Boolean,
    Time,
    Timestamp,
    Other,
}

impl ColumnKind {
    pub fn from_duckdb_type(ty: &str) -> Self {
        let ty = ty.trim().to_ascii_uppercase();
        match ty.as_str() {
            "VARCHAR" | "TEXT" | "STRING" | "CHAR" | "BPCHAR" => ColumnKind::Text,
            "TINYINT" | "SMALLINT" | "INTEGER" | "BIGINT" | "HUGEINT" | "UTINYINT"
            | "USMALLINT" | "UINTEGER" | "UBIGINT" | "UHUGEINT" => ColumnKind::Integer,
            "FLOAT" | "REAL" | "DOUBLE" => ColumnKind::Float,
            "BOOLEAN" => ColumnKind::Boolean,
            "TIME" | "TIME WITH TIME ZONE" => ColumnKind::Time,
            "DATE" => ColumnKind::Other,
            s if s.starts_with("TIMESTAMP") || s == "DATETIME" => ColumnKind::Timestamp,
            s if s.starts_with("DECIMAL") || s.starts_with("NUMERIC") => ColumnKind::Float,
            s if s.starts_with("VARCHAR") => ColumnKind::Text,
            _ => ColumnKind::Other,
        }
    }

    /// Whether values of this kind can carry an `HH:MM` clock reading.
    pub fn holds_clock(self) -> bool {
        matches!(
            self,
            ColumnKind::Text | ColumnKind::Time | ColumnKind::Timestamp
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub values: Vec<Option<String>>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    pub fn text<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(|v| Some(v.into())).collect();
        Self::new(name, ColumnKind::Text, values)
    }

    pub fn integers<I>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        let values = values.into_iter().map(|v| Some(v.to_string())).collect();
        Self::new(name, ColumnKind::Integer, values)
    }

    /// Values parsed as finite numbers; anything else becomes `None`.
    pub fn numeric_values(&self) -> Vec<Option<f64>> {
        self.values
            .iter()
            .map(|v| {
                v.as_deref()
                    .map(str::trim)
                    .and_then(|s| s.parse::<f64>().ok())
                    .filter(|x| x.is_finite())
            })
            .collect()
    }
}

/// In-memory columnar copy of a source table. Never mutated after load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> anyhow::Result<Self> {
        let rows = columns.first().map(|c| c.values.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.values.len() != rows) {
            return Err(anyhow!(
                "column {} has {} rows, expected {}",
                bad.name,
                bad.values.len(),
                rows
            ));
        }
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Csv,
    Parquet,
    Json,
    Xlsx,
}

impl SourceFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        let ext = path
            .extension()
            .and_then(|x| x.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Ok(SourceFormat::Csv),
            "parquet" => Ok(SourceFormat::Parquet),
            "json" | "jsonl" | "ndjson" => Ok(SourceFormat::Json),
            "xlsx" => Ok(SourceFormat::Xlsx),
            _ => bail!("unsupported data file extension: {}", path.display()),
        }
    }

    fn reader_sql(self, quoted_path: &str) -> String {
        match self {
            SourceFormat::Csv => format!("read_csv_auto('{quoted_path}', header = true)"),
            SourceFormat::Parquet => format!("read_parquet('{quoted_path}')"),
            SourceFormat::Json => format!("read_json_auto('{quoted_path}')"),
            SourceFormat::Xlsx => format!("read_xlsx('{quoted_path}', header = true)"),
        }
    }
}

/// Reads a CSV, Parquet, JSON or XLSX file through DuckDB into a [`Table`].
///
/// Every value is pulled as `VARCHAR`; the DuckDB column type is kept on the
/// [`Column`] so callers can reject whole columns of the wrong shape.
pub fn load_table(path: &Path) -> anyhow::Result<Table> {
    let format = SourceFormat::from_path(path)?;
    let conn = Connection::open_in_memory().context("open in-memory duckdb")?;
    if format == SourceFormat::Xlsx {
        conn.execute_batch("INSTALL excel; LOAD excel;")
            .context("load duckdb excel extension")?;
    }

    let reader = format.reader_sql(&sql_quote_path(path));
    conn.execute(
        &format!("CREATE OR REPLACE VIEW source_raw AS SELECT * FROM {reader}"),
        [],
    )
    .with_context(|| format!("create view over {}", path.display()))?;

    let schema = load_column_schema(&conn, "source_raw")?;
    if schema.is_empty() {
        bail!("{} has no columns", path.display());
    }

    let select = schema
        .iter()
        .map(|(name, _)| format!("CAST({} AS VARCHAR)", quote_ident(name)))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn
        .prepare(&format!("SELECT {select} FROM source_raw"))
        .context("prepare source select")?;

    let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); schema.len()];
    let mut rows = stmt.query([]).context("query source rows")?;
    while let Some(row) = rows.next().context("read source row")? {
        for (i, col) in values.iter_mut().enumerate() {
            col.push(row.get::<usize, Option<String>>(i)?);
        }
    }

    let columns = schema
        .into_iter()
        .zip(values)
        .map(|((name, ty), values)| Column::new(name, ColumnKind::from_duckdb_type(&ty), values))
        .collect();
    Table::new(columns)
}

fn load_column_schema(conn: &Connection, view_name: &str) -> anyhow::Result<Vec<(String, String)>> {
    let query = format!("SELECT name, type FROM pragma_table_info('{view_name}') ORDER BY cid");
    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("prepare pragma_table_info for {view_name}"))?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<usize, String>(0)?, row.get::<usize, String>(1)?))
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn sql_quote_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn maps_duckdb_types() {
        assert_eq!(ColumnKind::from_duckdb_type("VARCHAR"), ColumnKind::Text);
        assert_eq!(ColumnKind::from_duckdb_type("bigint"), ColumnKind::Integer);
        assert_eq!(ColumnKind::from_duckdb_type("DECIMAL(10,2)"), ColumnKind::Float);
        assert_eq!(ColumnKind::from_duckdb_type("TIME"), ColumnKind::Time);
        assert_eq!(
            ColumnKind::from_duckdb_type("TIMESTAMP WITH TIME ZONE"),
            ColumnKind::Timestamp
        );
        assert_eq!(ColumnKind::from_duckdb_type("BLOB"), ColumnKind::Other);
        assert!(ColumnKind::Time.holds_clock());
        assert!(!ColumnKind::Integer.holds_clock());
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = Table::new(vec![
            Column::text("NPI", ["a", "b"]),
            Column::text("Region", ["West"]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("Region"));
    }

    #[test]
    fn numeric_values_skip_garbage() {
        let col = Column::new(
            "attempts",
            ColumnKind::Text,
            vec![Some(" 3 ".into()), Some("n/a".into()), None, Some("NaN".into())],
        );
        assert_eq!(col.numeric_values(), vec![Some(3.0), None, None, None]);
    }

    #[test]
    fn loads_csv_through_duckdb() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "NPI,Speciality,Region,Count of Attempts").unwrap();
        writeln!(file, "NPI1,Cardiology,West,3").unwrap();
        writeln!(file, "NPI2,Oncology,South,7").unwrap();
        file.flush().unwrap();

        let table = load_table(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["NPI", "Speciality", "Region", "Count of Attempts"]
        );
        let attempts = table.column("Count of Attempts").unwrap();
        assert_eq!(attempts.kind, ColumnKind::Integer);
        assert_eq!(attempts.numeric_values(), vec![Some(3.0), Some(7.0)]);
        assert_eq!(
            table.column("Speciality").unwrap().values[1].as_deref(),
            Some("Oncology")
        );
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let err = load_table(Path::new("/tmp/doctors.bin")).unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}
