use clap::{Parser, Subcommand, ValueEnum};
use schemagate::write::SchemaView;
use schemagate::{
    DocumentStore, MemoryStore, Result, SchemaGateError, Store, WriteContext, WriteOptions,
};
use serde_json::{json, Value};
use std::process;

/// SchemaGate CLI: try writes against a schema file without touching a real database
#[derive(Parser)]
#[command(name = "schemagate", version, about)]
struct Cli {
    /// Path to the schema file
    #[arg(long, env = "SCHEMAGATE_SCHEMA", default_value = "schema.yaml")]
    schema: String,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    /// Acting user id, used for `owned` collections
    #[arg(long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ViewArg {
    Strict,
    Partial,
    DeepPartial,
}

impl From<ViewArg> for SchemaView {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::Strict => SchemaView::Strict,
            ViewArg::Partial => SchemaView::Partial,
            ViewArg::DeepPartial => SchemaView::DeepPartial,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Validate and insert a document, printing what would be stored
    Insert {
        /// Collection name
        collection: String,
        /// Document as JSON
        #[arg(default_value = "{}")]
        document: String,
        /// Extra field values (e.g. --field name="Alice Chen")
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        /// Store the document without hooks or validation
        #[arg(long)]
        skip_schema: bool,
    },

    /// Validate and apply an update modifier
    Update {
        /// Collection name
        collection: String,
        /// Modifier as JSON (e.g. '{"$set": {"age": 31}}')
        modifier: String,
        /// Document to update, stored as is before the update runs
        #[arg(long)]
        existing: Option<String>,
        /// Filter as JSON (defaults to the existing document's _id)
        #[arg(long)]
        filter: Option<String>,
        /// Insert when nothing matches
        #[arg(long)]
        upsert: bool,
        /// Update every matching document
        #[arg(long)]
        multi: bool,
        /// Apply the modifier without hooks or validation
        #[arg(long)]
        skip_schema: bool,
    },

    /// Show the descriptor a dotted path resolves to
    Resolve {
        /// Collection name
        collection: String,
        /// Dotted path (e.g. address.city)
        path: String,
    },

    /// Show a collection schema, synthetic fields included
    Describe {
        /// Collection name
        collection: String,
        /// Which view to show
        #[arg(long, default_value = "strict")]
        view: ViewArg,
    },
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        if let Some(aggregated) = e.validation() {
            // Structured issue list on stdout, summary on stderr.
            let issues = json!({ "issues": aggregated.issues });
            if let Err(print_err) = print_output(&issues, &cli.format) {
                eprintln!("ERROR:{print_err}");
            }
        }
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let store = Store::open(&cli.schema, MemoryStore::new())?;
    log::debug!(
        "Loaded schema '{}' with collections {:?}",
        cli.schema,
        store.collection_names()
    );
    let ctx = match &cli.user {
        Some(user) => WriteContext::new().with_user(user.as_str()),
        None => WriteContext::new(),
    };

    match &cli.command {
        Command::Insert {
            collection,
            document,
            fields,
            skip_schema,
        } => {
            let mut doc = parse_json(document, "document")?;
            merge_fields(&mut doc, fields)?;
            let mut options = WriteOptions::new();
            if *skip_schema {
                options = options.skip_schema();
            }

            let guarded = store.collection(collection)?;
            let id = guarded.insert(doc, &options, &ctx)?;
            let stored = guarded.find_one(&json!({ "_id": id }))?;
            print_output(&stored.unwrap_or(Value::Null), &cli.format)?;
        }

        Command::Update {
            collection,
            modifier,
            existing,
            filter,
            upsert,
            multi,
            skip_schema,
        } => {
            let guarded = store.collection(collection)?;
            let seeded = match existing {
                Some(existing) => {
                    let doc = parse_json(existing, "existing document")?;
                    Some(store.backend().insert(collection, doc)?)
                }
                None => None,
            };
            let filter = match (filter, &seeded) {
                (Some(filter), _) => parse_json(filter, "filter")?,
                (None, Some(id)) => json!({ "_id": id }),
                (None, None) => json!({}),
            };

            let mut options = WriteOptions::new();
            if *upsert {
                options = options.upsert();
            }
            if *multi {
                options = options.multi();
            }
            if *skip_schema {
                options = options.skip_schema();
            }

            let modifier = parse_json(modifier, "modifier")?;
            let result = guarded.update(filter.clone(), modifier, &options, &ctx)?;

            let lookup = match (&result.upserted_id, &seeded) {
                (Some(id), _) | (None, Some(id)) => json!({ "_id": id }),
                (None, None) => filter,
            };
            let output = json!({
                "matched": result.matched,
                "modified": result.modified,
                "upserted_id": result.upserted_id,
                "document": guarded.find_one(&lookup)?,
            });
            print_output(&output, &cli.format)?;
        }

        Command::Resolve { collection, path } => {
            let schema = store
                .collection(collection)?
                .schema()
                .ok_or_else(|| no_schema(collection))?;
            let descriptor = schemagate::path::resolve(schema, path).ok_or_else(|| {
                SchemaGateError::Other(format!(
                    "Path '{path}' is not declared in collection '{collection}'"
                ))
            })?;
            print_output(&descriptor.describe(), &cli.format)?;
        }

        Command::Describe { collection, view } => {
            let views = store
                .collection(collection)?
                .binding()
                .views()
                .ok_or_else(|| no_schema(collection))?;
            print_output(&views.view((*view).into()).describe(), &cli.format)?;
        }
    }

    Ok(())
}

fn no_schema(collection: &str) -> SchemaGateError {
    SchemaGateError::Config(format!("Collection '{collection}' has no schema"))
}

fn parse_json(text: &str, what: &str) -> Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| SchemaGateError::Other(format!("Invalid JSON for {what}: {e}")))
}

/// `--field` values are parsed as JSON when possible, otherwise kept as strings.
fn merge_fields(doc: &mut Value, fields: &[(String, String)]) -> Result<()> {
    if fields.is_empty() {
        return Ok(());
    }
    let map = doc
        .as_object_mut()
        .ok_or_else(|| SchemaGateError::Other("--field needs a JSON object document".into()))?;
    for (key, val) in fields {
        let value = serde_json::from_str(val).unwrap_or_else(|_| Value::String(val.clone()));
        map.insert(key.clone(), value);
    }
    Ok(())
}

fn print_output(value: &Value, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("name=Alice Chen").unwrap(),
            ("name".to_string(), "Alice Chen".to_string())
        );
        assert_eq!(parse_key_value("expr=a=b").unwrap().1, "a=b");
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn test_merge_fields_parses_json_values() {
        let mut doc = json!({ "name": "A" });
        merge_fields(
            &mut doc,
            &[("age".into(), "31".into()), ("nick".into(), "bob".into())],
        )
        .unwrap();
        assert_eq!(doc, json!({ "name": "A", "age": 31, "nick": "bob" }));
    }

    #[test]
    fn test_cli_parses_update() {
        let cli = Cli::try_parse_from([
            "schemagate",
            "--schema",
            "s.yaml",
            "update",
            "people",
            r#"{"$set":{"age":1}}"#,
            "--upsert",
        ])
        .unwrap();
        assert_eq!(cli.schema, "s.yaml");
        assert!(matches!(cli.command, Command::Update { upsert: true, .. }));
    }
}
