//! Purpose: `marklogic` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs one REST call, prints the body.
//! Invariants: Response bodies go to stdout untouched; errors are emitted as
//! JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]

use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use marklogic::api::{
    AuthScheme, Capability, Client, Config, DocumentContent, Error, ErrorKind, EvalLanguage,
    EvalOptions, Format, Permission, ReadOptions, Response, SearchOptions, WriteOptions,
    to_exit_code,
};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marklogic", version, about = "MarkLogic REST API client")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Verbose logging on stderr (RUST_LOG overrides the level).
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConnectionArgs {
    /// MarkLogic host.
    #[arg(long, global = true, default_value = "localhost")]
    host: String,

    /// App server port.
    #[arg(long, global = true, default_value_t = 8000)]
    port: u16,

    /// Username; authentication is applied only when --password is also set.
    #[arg(long, global = true)]
    user: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = AuthArg::Digest)]
    auth: AuthArg,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AuthArg {
    Basic,
    Digest,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Json,
    Xml,
    Text,
    Binary,
}

impl FormatArg {
    fn to_format(self) -> Format {
        match self {
            FormatArg::Json => Format::Json,
            FormatArg::Xml => Format::Xml,
            FormatArg::Text => Format::Text,
            FormatArg::Binary => Format::Binary,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LanguageArg {
    Xquery,
    Javascript,
}

#[derive(Subcommand)]
enum Command {
    /// Read a document and print its body.
    Get {
        uri: String,
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        #[arg(long)]
        txid: Option<String>,
    },
    /// Write a document from a file or stdin.
    Put {
        uri: String,
        /// Document source; stdin when omitted.
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,
        /// Collection to assign; repeatable.
        #[arg(long = "collection")]
        collections: Vec<String>,
        /// Permission as role:cap1,cap2; repeatable.
        #[arg(long = "perm")]
        permissions: Vec<String>,
        #[arg(long)]
        txid: Option<String>,
    },
    /// Delete a document.
    Delete {
        uri: String,
        #[arg(long)]
        txid: Option<String>,
    },
    /// Run a string query against the search endpoint.
    Search {
        query: String,
        #[arg(long, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,
        /// Extra query parameter as name=value; repeatable.
        #[arg(long = "param")]
        params: Vec<String>,
        #[arg(long)]
        txid: Option<String>,
    },
    /// Evaluate code on the server and print the raw multipart body.
    Eval {
        /// Code source file; use --code for inline code.
        #[arg(long, conflicts_with = "code")]
        file: Option<PathBuf>,
        #[arg(short = 'e', long)]
        code: Option<String>,
        #[arg(long, value_enum, default_value_t = LanguageArg::Xquery)]
        language: LanguageArg,
        /// External variable as name=json; repeatable.
        #[arg(long = "var")]
        vars: Vec<String>,
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        txid: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        init_tracing();
    }
    let exit_code = match run(cli) {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<(), Error> {
    let client = Client::new(build_config(&cli.connection));
    let result = dispatch(&client, cli.command);
    client.shutdown();
    result
}

fn dispatch(client: &Client, command: Command) -> Result<(), Error> {
    match command {
        Command::Get { uri, format, txid } => {
            let mut options = ReadOptions::new();
            options.format = format.map(FormatArg::to_format);
            options.txid = txid;
            let response = client.read_document(&uri, &options)?;
            write_body(&response)
        }
        Command::Put {
            uri,
            file,
            format,
            collections,
            permissions,
            txid,
        } => {
            let bytes = read_input(file.as_deref())?;
            let content = build_content(format, bytes)?;
            let mut options = WriteOptions::new();
            options.collections = collections;
            options.permissions = permissions
                .iter()
                .map(|raw| parse_permission(raw))
                .collect::<Result<_, _>>()?;
            options.txid = txid;
            client.write_document(&uri, &content, &options)?;
            println!("{}", json!({"ok": true, "uri": uri}));
            Ok(())
        }
        Command::Delete { uri, txid } => {
            client.delete_document(&uri, txid.as_deref())?;
            println!("{}", json!({"ok": true, "uri": uri}));
            Ok(())
        }
        Command::Search {
            query,
            format,
            params,
            txid,
        } => {
            let mut options = SearchOptions::new();
            options.format = format.to_format();
            options.params = params
                .iter()
                .map(|raw| parse_pair(raw, "--param"))
                .collect::<Result<_, _>>()?;
            options.txid = txid;
            let response = client.search(&query, &options)?;
            write_body(&response)
        }
        Command::Eval {
            file,
            code,
            language,
            vars,
            database,
            txid,
        } => {
            let code = match (code, file) {
                (Some(code), _) => code,
                (None, Some(path)) => String::from_utf8(read_input(Some(path.as_path()))?)
                    .map_err(|err| {
                    Error::new(ErrorKind::InvalidArgument)
                        .with_message("eval code is not valid utf-8")
                        .with_source(err)
                })?,
                (None, None) => {
                    return Err(Error::new(ErrorKind::InvalidArgument)
                        .with_message("eval needs code")
                        .with_hint("Pass --code or --file."));
                }
            };
            let mut options = EvalOptions::new();
            options.language = match language {
                LanguageArg::Xquery => EvalLanguage::Xquery,
                LanguageArg::Javascript => EvalLanguage::Javascript,
            };
            options.vars = build_vars(&vars)?;
            options.database = database;
            options.txid = txid;
            let response = client.eval(&code, &options)?;
            write_body(&response)
        }
    }
}

fn build_config(args: &ConnectionArgs) -> Config {
    let mut config = Config::new()
        .with_host(args.host.clone())
        .with_port(args.port)
        .with_auth(match args.auth {
            AuthArg::Basic => AuthScheme::Basic,
            AuthArg::Digest => AuthScheme::Digest,
        });
    if let (Some(user), Some(password)) = (&args.user, &args.password) {
        config = config.with_credentials(user.clone(), password.clone());
    }
    config
}

fn write_body(response: &Response) -> Result<(), Error> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(response.body()).map_err(write_failed)?;
    if !response.body().ends_with(b"\n") {
        stdout.write_all(b"\n").map_err(write_failed)?;
    }
    Ok(())
}

fn write_failed(err: io::Error) -> Error {
    Error::new(ErrorKind::Internal)
        .with_message("failed to write response body to stdout")
        .with_source(err)
}

fn read_input(file: Option<&std::path::Path>) -> Result<Vec<u8>, Error> {
    match file {
        Some(path) => std::fs::read(path).map_err(|err| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("failed to read {}", path.display()))
                .with_source(err)
        }),
        None => {
            let mut bytes = Vec::new();
            io::stdin().read_to_end(&mut bytes).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to read stdin")
                    .with_source(err)
            })?;
            Ok(bytes)
        }
    }
}

fn build_content(format: FormatArg, bytes: Vec<u8>) -> Result<DocumentContent, Error> {
    match format {
        FormatArg::Json => {
            let value = serde_json::from_slice(&bytes).map_err(|err| {
                Error::new(ErrorKind::InvalidArgument)
                    .with_message("document is not valid json")
                    .with_source(err)
            })?;
            Ok(DocumentContent::Json(value))
        }
        FormatArg::Xml => Ok(DocumentContent::Xml(into_utf8(bytes)?)),
        FormatArg::Text => Ok(DocumentContent::Text(into_utf8(bytes)?)),
        FormatArg::Binary => Ok(DocumentContent::Binary(bytes)),
    }
}

fn into_utf8(bytes: Vec<u8>) -> Result<String, Error> {
    String::from_utf8(bytes).map_err(|err| {
        Error::new(ErrorKind::InvalidArgument)
            .with_message("document is not valid utf-8")
            .with_source(err)
    })
}

fn parse_permission(raw: &str) -> Result<Permission, Error> {
    let Some((role, capabilities)) = raw.split_once(':') else {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("malformed permission: {raw}"))
            .with_hint("Use role:cap1,cap2 (e.g. editor:read,update)."));
    };
    let capabilities = capabilities
        .split(',')
        .filter(|cap| !cap.is_empty())
        .map(parse_capability)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Permission::new(role, capabilities))
}

fn parse_capability(raw: &str) -> Result<Capability, Error> {
    match raw {
        "read" => Ok(Capability::Read),
        "insert" => Ok(Capability::Insert),
        "update" => Ok(Capability::Update),
        "node-update" => Ok(Capability::NodeUpdate),
        "execute" => Ok(Capability::Execute),
        other => Err(Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("unknown capability: {other}"))
            .with_hint("Capabilities: read, insert, update, node-update, execute.")),
    }
}

fn parse_pair(raw: &str, flag: &str) -> Result<(String, String), Error> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("malformed {flag} value: {raw}"))
                .with_hint("Use name=value.")
        })
}

/// `--var name=json`; values that do not parse as JSON are taken as strings.
fn build_vars(raw_vars: &[String]) -> Result<Option<Value>, Error> {
    if raw_vars.is_empty() {
        return Ok(None);
    }
    let mut vars = Map::new();
    for raw in raw_vars {
        let (name, value) = parse_pair(raw, "--var")?;
        let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
        vars.insert(name, value);
    }
    Ok(Some(Value::Object(vars)))
}

fn emit_error(err: &Error) {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert(
        "message".to_string(),
        json!(err.message().unwrap_or("request failed")),
    );
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    if let Some(body) = err.body() {
        inner.insert("body".to_string(), json!(body));
    }
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    let value = Value::Object(Map::from_iter([(
        "error".to_string(),
        Value::Object(inner),
    )]));
    let encoded = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{encoded}");
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
