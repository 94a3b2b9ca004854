use clap::{ArgAction, Args, Parser, Subcommand};
use netbench::config::settings::load_settings;
use netbench::logs::logger::configure_logger;
use netbench::models::settings::{
    AuthSettings, HttpSettings, ProtocolSettings, RunSettings, SmtpSettings,
};
use netbench::runner::Runner;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "netbench",
    version,
    about = "netbench is a network benchmark tool for http/s and smtp"
)]
struct Cli {
    /// Json format config file to load settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of concurrent connections
    #[arg(short = 'c', long = "concurency", value_name = "N")]
    concurency: Option<u32>,

    /// Number of total requests to send
    #[arg(short = 'n', long = "treq", value_name = "N")]
    treq: Option<u64>,

    /// Total duration: 1s, 1m, 500ms etc
    #[arg(short = 'd', long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Benchmark an HTTP/1.1 or HTTP/2 endpoint
    Http(HttpArgs),
    /// Benchmark an SMTP server
    Smtp(SmtpArgs),
}

#[derive(Debug, Args)]
struct HttpArgs {
    /// Target URI
    #[arg(value_name = "URL")]
    url: String,

    /// Http method to use
    #[arg(short = 'm', long, default_value = "GET")]
    method: String,

    /// Headers in key=value format and comma(,) separated
    #[arg(short = 'H', long, value_name = "K=V", value_delimiter = ',')]
    headers: Vec<String>,

    /// HTTP version 1 or 2
    #[arg(short = 'v', long = "Version", default_value = "1")]
    version: String,

    /// HTTP body to send
    #[arg(short = 'b', long, default_value = "")]
    body: String,

    /// File to send as http body
    #[arg(short = 'f', long = "body_file")]
    body_file: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(short = 't', long = "time_out", value_name = "SECONDS", default_value_t = 30)]
    time_out: u64,

    /// Toggle keep-alive, --keep_alive=[true|false]
    #[arg(long = "keep_alive", value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    keep_alive: bool,

    /// Toggle compression, --compression=[true|false]
    #[arg(long, value_name = "BOOL", default_value_t = false, action = ArgAction::Set)]
    compression: bool,

    /// Toggle redirect following, --redirect=[true|false]
    #[arg(long, value_name = "BOOL", default_value_t = false, action = ArgAction::Set)]
    redirect: bool,

    /// HTTP proxy URL
    #[arg(long, value_name = "URL")]
    proxy: Option<String>,

    /// Basic auth username
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Basic auth password
    #[arg(short = 'p', long)]
    password: Option<String>,
}

#[derive(Debug, Args)]
struct SmtpArgs {
    /// SMTP server as host:port
    #[arg(value_name = "HOST:PORT")]
    address: String,

    /// SMTP FROM (required)
    #[arg(short = 'f', long)]
    from: String,

    /// SMTP to list (required, repeatable)
    #[arg(short = 't', long, required = true, action = ArgAction::Append)]
    to: Vec<String>,

    /// Mail subject (required)
    #[arg(short = 's', long)]
    subject: String,

    /// SMTP CC list
    #[arg(long, action = ArgAction::Append)]
    cc: Vec<String>,

    /// SMTP BCC list
    #[arg(long, action = ArgAction::Append)]
    bcc: Vec<String>,

    /// Use STARTTLS
    #[arg(long, action = ArgAction::SetTrue)]
    tls: bool,

    /// Auth username
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Auth password
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Auth method (CRAM, PLAIN)
    #[arg(short = 'm', long = "method", value_name = "METHOD")]
    method: Option<String>,

    /// Create mail from eml file
    #[arg(short = 'e', long)]
    eml: Option<PathBuf>,

    /// SMTP text body
    #[arg(short = 'b', long, default_value = "")]
    body: String,

    /// SMTP html body file
    #[arg(long = "bodyhtml")]
    bodyhtml: Option<PathBuf>,

    /// Generate smtp body from file
    #[arg(long = "bodyfile")]
    bodyfile: Option<PathBuf>,

    /// Headers in key=value format and comma(,) separated
    #[arg(short = 'H', long, value_name = "K=V", value_delimiter = ',')]
    headers: Vec<String>,

    /// List of attachments (repeatable)
    #[arg(long = "attachment", action = ArgAction::Append)]
    attachment: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    configure_logger();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{}", err);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let Cli {
        config,
        concurency,
        treq,
        duration,
        command,
    } = cli;

    if treq.is_some() && duration.is_some() {
        return Err("Cant set both duration(d) and total request(n)".into());
    }
    if config.is_some() && command.is_some() {
        return Err("Cannot use subcommand when config file flag used!".into());
    }

    let settings = match (config, command) {
        (Some(path), _) => {
            let mut settings = load_settings(&path)?;
            // The file wins for everything it sets; the scheduling flags
            // fill in when the file leaves both termination rules unset.
            if settings.total_requests == 0 && settings.duration.is_zero() {
                match duration {
                    Some(duration) => settings.duration = duration,
                    None => settings.total_requests = treq.unwrap_or(1),
                }
            }
            if let Some(concurrency) = concurency {
                settings.concurrency = concurrency;
            }
            settings
        }
        (None, Some(command)) => {
            let protocol = match command {
                Command::Http(args) => http_settings(args)?,
                Command::Smtp(args) => smtp_settings(args)?,
            };
            RunSettings {
                concurrency: concurency.unwrap_or(1),
                total_requests: if duration.is_some() { 0 } else { treq.unwrap_or(1) },
                duration: duration.unwrap_or(Duration::ZERO),
                output: None,
                protocol,
            }
        }
        (None, None) => return Err("Please select config file or a subcommand".into()),
    };

    Runner::from_settings(settings)?.run().await?;
    Ok(())
}

fn http_settings(args: HttpArgs) -> Result<ProtocolSettings, Box<dyn std::error::Error>> {
    Ok(ProtocolSettings::Http(HttpSettings {
        url: args.url,
        method: args.method,
        version: args.version,
        headers: parse_headers(&args.headers)?,
        body: args.body,
        body_file: args.body_file,
        timeout: args.time_out,
        keep_alive: args.keep_alive,
        compression: args.compression,
        redirect: args.redirect,
        proxy: args.proxy,
        auth: AuthSettings {
            username: args.username.unwrap_or_default(),
            password: args.password.unwrap_or_default(),
            method: String::new(),
        },
    }))
}

fn smtp_settings(args: SmtpArgs) -> Result<ProtocolSettings, Box<dyn std::error::Error>> {
    Ok(ProtocolSettings::Smtp(SmtpSettings {
        address: args.address,
        tls: args.tls,
        auth: AuthSettings {
            username: args.username.unwrap_or_default(),
            password: args.password.unwrap_or_default(),
            method: args.method.unwrap_or_default(),
        },
        from: args.from,
        to: args.to,
        cc: args.cc,
        bcc: args.bcc,
        subject: args.subject,
        headers: parse_headers(&args.headers)?,
        body: args.body,
        body_file: args.bodyfile,
        body_html: args.bodyhtml,
        attachments: args.attachment,
        eml: args.eml,
        timeout: 30,
    }))
}

fn parse_headers(raw: &[String]) -> Result<HashMap<String, String>, Box<dyn std::error::Error>> {
    let mut headers = HashMap::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| format!("invalid header '{}': expected key=value", entry))?;
        headers.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(headers)
}
