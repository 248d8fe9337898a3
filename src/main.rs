use anyhow::{Context, Result};
use cgnet::config::parse_pair;
use cgnet::{
    Attachment, DataTransferError, DefaultNetworkService, Endpoint, ErrorReport, HttpMethod,
    NetworkConfig, NetworkService,
};
use clap::Parser;
use log::debug;
use std::io::Write;
use std::path::Path;

/// cgnet - send declarative HTTP requests and report failures by kind
///
/// Paths are resolved against the base URL. Server error envelopes
/// ({"error":{"errors":[{"code":..}]}}) are decoded and reported as
/// server errors or expired tokens.
///
/// Examples:
///   cgnet -b https://api.example.com get users/1
///   cgnet -b https://api.example.com send POST users --json '{"name":"ada"}'
///   cgnet -b https://api.example.com upload avatar -f user=1 -a photo=me.jpg
#[derive(Parser, Debug)]
#[command(author, version = env!("CGNET_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL every path is resolved against (also via CGNET_BASE_URL)
    #[arg(
        long = "base-url",
        short = 'b',
        env = "CGNET_BASE_URL",
        value_name = "URL",
        global = true
    )]
    pub base_url: Option<String>,

    /// Header sent with every request, as "Name: value"
    #[arg(long = "header", short = 'H', value_name = "NAME: VALUE", global = true)]
    pub headers: Vec<String>,

    /// Query parameter sent with every request, as "name=value"
    #[arg(long = "query", short = 'q', value_name = "NAME=VALUE", global = true)]
    pub query: Vec<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Send a GET request and print the response body
    Get(GetArgs),

    /// Send a request with any method and an optional JSON body
    Send(SendArgs),

    /// Send a multipart/form-data request
    Upload(UploadArgs),
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Path relative to the base URL
    #[arg(value_name = "PATH")]
    pub path: String,
}

#[derive(clap::Args, Debug)]
pub struct SendArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE, HEAD)
    #[arg(value_name = "METHOD")]
    pub method: HttpMethod,

    /// Path relative to the base URL
    #[arg(value_name = "PATH")]
    pub path: String,

    /// JSON request body
    #[arg(long, value_name = "JSON")]
    pub json: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Path relative to the base URL
    #[arg(value_name = "PATH")]
    pub path: String,

    /// HTTP method to upload with
    #[arg(long, short = 'X', default_value = "POST")]
    pub method: HttpMethod,

    /// Form field, as "name=value" (repeatable, sent in order)
    #[arg(long = "field", short = 'f', value_name = "NAME=VALUE")]
    pub fields: Vec<String>,

    /// File attachment, as "field=PATH" (repeatable, sent after the fields)
    #[arg(long = "attach", short = 'a', value_name = "FIELD=PATH")]
    pub attachments: Vec<String>,
}

fn build_config(cli: &Cli) -> Result<NetworkConfig> {
    let base_url = cli
        .base_url
        .as_deref()
        .context("No base URL given. Pass --base-url or set CGNET_BASE_URL.")?;

    let mut config = NetworkConfig::parse(base_url)?;
    for header in &cli.headers {
        let (name, value) = parse_pair(header, ':')?;
        config = config.with_header(name, value);
    }
    for query in &cli.query {
        let (name, value) = parse_pair(query, '=')?;
        config = config.with_query(name, value);
    }
    Ok(config)
}

fn send_endpoint(args: SendArgs) -> Result<Endpoint> {
    let mut endpoint = Endpoint::new(args.method, args.path);
    if let Some(json) = args.json {
        let body = serde_json::from_str(&json).context("Invalid --json body")?;
        endpoint = endpoint.with_body(body);
    }
    Ok(endpoint)
}

fn upload_endpoint(args: UploadArgs) -> Result<Endpoint> {
    let mut endpoint = Endpoint::new(args.method, args.path);
    for field in &args.fields {
        let (name, value) = parse_pair(field, '=')?;
        endpoint = endpoint.with_form_field(name, value);
    }
    for attachment in &args.attachments {
        let (field, path) = parse_pair(attachment, '=')?;
        endpoint = endpoint.with_attachment(field, read_attachment(Path::new(&path))?);
    }
    Ok(endpoint)
}

fn read_attachment(path: &Path) -> Result<Attachment> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read attachment {:?}", path))?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    debug!("Attaching {:?} ({} bytes, {})", path, data.len(), mime);

    let mut attachment = Attachment::new(data).with_mime_type(mime.essence_str());
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        attachment = attachment.with_file_name(name);
    }
    Ok(attachment)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let service = DefaultNetworkService::with_config(build_config(&cli)?);

    let result = match cli.command {
        Commands::Get(args) => service.request(&Endpoint::get(args.path)).await,
        Commands::Send(args) => service.request(&send_endpoint(args)?).await,
        Commands::Upload(args) => service.request_multipart(&upload_endpoint(args)?).await,
    };

    match result {
        Ok(Some(data)) => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&data)
                .context("Failed to write response body")?;
            if !data.ends_with(b"\n") {
                writeln!(stdout)?;
            }
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(error) => {
            let report = ErrorReport::from(&DataTransferError::from(error));
            anyhow::bail!("{}", report)
        }
    }
}
