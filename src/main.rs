use anyhow::{Context, Result};
use bombard::{
    get_writer, install_otlp_meter_provider, load_targets_file, parse_headers, parse_params,
    write_text_report, AttackOptions, Bombard, EngineConfig, Environment, HttpEngine,
    HttpTargetOverlay, KeyFormInput, RequestMethod, RequestType, RunOutput, RunRequest, Target,
    TargetOverlay, WebSocketTargetOverlay,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Targets file (JSON)
    #[arg(long, global = true, default_value = "targets.json")]
    targets: PathBuf,

    /// Ceiling for client-requested attack durations
    #[arg(long = "max-attack-duration", global = true, default_value = "30s")]
    max_attack_duration: humantime::Duration,

    /// Ceiling for client-requested attack rates (requests per second)
    #[arg(long = "max-attack-rate", global = true, default_value = "3000")]
    max_attack_rate: u32,

    /// Ceiling for client-requested request timeouts
    #[arg(long = "max-attack-timeout", global = true, default_value = "30s")]
    max_attack_timeout: humantime::Duration,

    /// Directory attack results are stored in
    #[arg(long = "results-dir", global = true, default_value = "testdata")]
    results_dir: PathBuf,

    /// Suffix appended to result file names
    #[arg(long = "results-suffix", global = true, default_value = "")]
    results_suffix: String,

    /// OpenTelemetry collector address (e.g. http://localhost:4318) metrics are exported to
    #[arg(long = "opentelemetry-addr", global = true)]
    opentelemetry_addr: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered targets and their endpoints
    List,

    /// Run an endpoint once
    Run {
        #[command(flatten)]
        request: RequestArgs,

        /// Output file
        #[arg(long, default_value = "stdout")]
        output: String,
    },

    /// Attack an HTTP endpoint at a sustained rate
    Attack {
        #[command(flatten)]
        request: RequestArgs,

        /// Initial number of workers [default = number of cpus]
        #[arg(long)]
        workers: Option<usize>,

        /// Maximum number of workers
        #[arg(long)]
        max_workers: Option<usize>,

        /// Max open idle connections per target host
        #[arg(long, default_value = "10000")]
        connections: usize,

        /// Ignore invalid server TLS certificates
        #[arg(long)]
        insecure: bool,

        /// Number of redirects to follow. -1 will not follow but marks as success
        #[arg(long, default_value = "10")]
        redirects: i32,

        /// Maximum number of bytes to capture from response bodies. [-1 = no limit]
        #[arg(long = "max-body", value_name = "value", default_value = "-1")]
        max_body: i64,
    },

    /// Inspect stored attack results
    Results {
        #[command(subcommand)]
        command: ResultsCommands,
    },
}

#[derive(Subcommand)]
enum ResultsCommands {
    /// List the results of an HTTP endpoint
    List { target: String, http_target: String },

    /// Print the report of a result
    Show {
        target: String,
        http_target: String,
        name: String,

        /// Report type to generate [text, json]
        #[arg(long = "type", default_value = "text")]
        report_type: String,

        /// Output file
        #[arg(long, default_value = "stdout")]
        output: String,
    },

    /// Delete a result and its file
    Delete {
        target: String,
        http_target: String,
        name: String,
    },
}

#[derive(Args)]
struct RequestArgs {
    /// Target id
    target: String,

    /// Endpoint id within the target
    sub_target: String,

    /// Request header, "Name: Value"
    #[arg(long = "header", value_name = "value")]
    headers: Vec<String>,

    /// Request parameter, "name=value"
    #[arg(long = "param", value_name = "value")]
    params: Vec<String>,

    /// Variable, "name=value"
    #[arg(long = "var", value_name = "value")]
    vars: Vec<String>,

    /// Request method, honored by customizable endpoints only
    #[arg(long)]
    method: Option<RequestMethod>,

    /// Request path, honored by customizable endpoints only
    #[arg(long)]
    path: Option<String>,

    /// Parameter encoding [none, query, form, json], customizable endpoints only
    #[arg(long = "type")]
    request_type: Option<RequestType>,

    /// Duration of the attack
    #[arg(long)]
    duration: Option<humantime::Duration>,

    /// Requests per second
    #[arg(long)]
    rate: Option<u32>,

    /// Requests timeout
    #[arg(long)]
    timeout: Option<humantime::Duration>,
}

impl RequestArgs {
    /// Build a run request starting from the endpoint's registered values.
    fn to_run_request(&self, target: &Target) -> Result<RunRequest> {
        let mut vars = target.vars.clone();
        extend(&mut vars, parse_params(&self.vars)?);

        let opts = AttackOptions::new(
            self.duration.map(Into::into).unwrap_or(Duration::ZERO),
            self.rate.unwrap_or(0),
            self.timeout.map(Into::into).unwrap_or(Duration::ZERO),
        );
        let overlay = TargetOverlay {
            id: target.id.clone(),
            opts,
            vars,
        };

        let headers = bombard::headers_to_form(&parse_headers(&self.headers)?);
        let params = parse_params(&self.params)?;

        if let Some(ht) = target.find_http_target(&self.sub_target) {
            let mut http_overlay = HttpTargetOverlay {
                id: ht.id.clone(),
                method: self.method.unwrap_or(ht.method),
                path: self.path.clone().unwrap_or_else(|| ht.path.clone()),
                request_type: self.request_type.unwrap_or(ht.request_type),
                headers: ht.headers.clone(),
                params: ht.params.clone(),
            };
            extend(&mut http_overlay.headers, headers);
            extend(&mut http_overlay.params, params);
            return Ok(RunRequest {
                target: overlay,
                http_target: Some(http_overlay),
                web_socket_target: None,
            });
        }

        let wt = target
            .find_web_socket_target(&self.sub_target)
            .with_context(|| format!("Unknown endpoint {} in target {}", self.sub_target, target.id))?;
        let mut ws_overlay = WebSocketTargetOverlay {
            id: wt.id.clone(),
            headers: wt.headers.clone(),
            params: wt.params.clone(),
        };
        extend(&mut ws_overlay.headers, headers);
        extend(&mut ws_overlay.params, params);
        Ok(RunRequest {
            target: overlay,
            http_target: None,
            web_socket_target: Some(ws_overlay),
        })
    }
}

fn extend(base: &mut KeyFormInput, overrides: KeyFormInput) {
    for (name, input) in overrides.0 {
        base.insert(name, input);
    }
}

fn load(cli: &Cli, engine: HttpEngine) -> Result<Bombard> {
    let env = Environment {
        max_attack_duration: cli.max_attack_duration.into(),
        max_attack_rate: cli.max_attack_rate,
        max_attack_timeout: cli.max_attack_timeout.into(),
        results_dir: cli.results_dir.clone(),
        results_suffix: cli.results_suffix.clone(),
    };
    let bombard = Bombard::new(env)?.with_engine(Arc::new(engine));
    for target in load_targets_file(&cli.targets)? {
        bombard.register_target(target)?;
    }
    Ok(bombard)
}

fn find_target(bombard: &Bombard, target_id: &str) -> Result<Target> {
    bombard
        .target(target_id)
        .with_context(|| format!("Unknown target: {}", target_id))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let meter_provider = match &cli.opentelemetry_addr {
        Some(addr) => Some(install_otlp_meter_provider(addr)?),
        None => None,
    };

    match &cli.command {
        Some(Commands::List) => {
            let bombard = load(&cli, HttpEngine::default())?;
            let mut out = std::io::stdout();
            for target in bombard.targets() {
                writeln!(out, "{}\t{}\t{}", target.id, target.name, target.base_url)?;
                for ht in &target.http_targets {
                    writeln!(
                        out,
                        "  http\t{}\t{} {}{}",
                        ht.id,
                        ht.method,
                        ht.path,
                        if ht.allow_attack { "\t(attack)" } else { "" }
                    )?;
                }
                for wt in &target.web_socket_targets {
                    writeln!(out, "  ws\t{}\t{}", wt.id, wt.name)?;
                }
            }
        }
        Some(Commands::Run { request, output }) => {
            let bombard = load(&cli, HttpEngine::default())?;
            let target = find_target(&bombard, &request.target)?;
            let req = request.to_run_request(&target)?;

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let mut writer = get_writer(output)?;
            match bombard.run_request(req, &cancel).await? {
                RunOutput::Http(response) => {
                    writeln!(writer, "{} {}", response.method, response.url)?;
                    writeln!(writer, "{}", response.status)?;
                    for header in &response.response_headers {
                        writeln!(writer, "{}: {}", header.name, header.value)?;
                    }
                    writeln!(writer)?;
                    writeln!(writer, "{}", response.body_text())?;
                }
                RunOutput::WebSocket(reply) => {
                    writeln!(writer, "{}", String::from_utf8_lossy(&reply))?;
                }
            }
        }
        Some(Commands::Attack {
            request,
            workers,
            max_workers,
            connections,
            insecure,
            redirects,
            max_body,
        }) => {
            let mut config = EngineConfig::default();
            if let Some(workers) = workers {
                config.workers = *workers;
            }
            config.max_workers = *max_workers;
            config.connections = *connections;
            config.insecure = *insecure;
            config.redirects = *redirects;
            config.max_body = *max_body;

            let bombard = load(&cli, HttpEngine::new(config))?;
            let target = find_target(&bombard, &request.target)?;
            let req = request.to_run_request(&target)?;

            let handle = bombard.attack_request(req).await?;
            let duration = bombard
                .target(&request.target)
                .map(|t| t.opts.duration())
                .unwrap_or_default();

            let progress_style = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("##-");
            let progress_bar = ProgressBar::new(duration.as_secs());
            progress_bar.set_style(progress_style);

            let progress = handle.progress();
            let start_time = Instant::now();
            let wait = handle.wait();
            tokio::pin!(wait);
            let mut ticker = tokio::time::interval(Duration::from_millis(200));
            let outcome = loop {
                tokio::select! {
                    outcome = &mut wait => break outcome,
                    _ = tokio::signal::ctrl_c(), if !progress.is_cancelled() => progress.cancel(),
                    _ = ticker.tick() => {
                        progress_bar.set_position(start_time.elapsed().as_secs().min(duration.as_secs()));
                        progress_bar.set_message(format!("{} hits", progress.hits()));
                    }
                }
            };

            match outcome? {
                Some(result) => {
                    progress_bar.finish_with_message(format!("{} hits, stored {}", progress.hits(), result.name));
                    let metrics = result.report().context("Failed to read attack result")?;
                    write_text_report(&mut std::io::stdout(), &metrics)?;
                }
                None => progress_bar.abandon_with_message("Attack cancelled"),
            }
        }
        Some(Commands::Results { command }) => {
            let bombard = load(&cli, HttpEngine::default())?;
            match command {
                ResultsCommands::List { target, http_target } => {
                    for result in bombard.list_results(target, http_target)? {
                        println!("{}", result.name);
                    }
                }
                ResultsCommands::Show {
                    target,
                    http_target,
                    name,
                    report_type,
                    output,
                } => {
                    let metrics = bombard.result_report(target, http_target, name)?;
                    let mut writer = get_writer(output)?;
                    match report_type.as_str() {
                        "text" => write_text_report(&mut writer, &metrics)?,
                        "json" => {
                            serde_json::to_writer_pretty(&mut writer, &metrics)?;
                            writeln!(writer)?;
                        }
                        _ => anyhow::bail!("Unsupported report type: {}", report_type),
                    }
                }
                ResultsCommands::Delete {
                    target,
                    http_target,
                    name,
                } => match bombard.delete_result(target, http_target, name)? {
                    Some(result) => println!("Deleted {}", result.name),
                    None => println!("No result named {}", name),
                },
            }
        }
        None => {
            println!("No command specified. Use --help for usage information.");
        }
    }

    if let Some(provider) = meter_provider {
        provider.shutdown().context("Failed to flush OpenTelemetry metrics")?;
    }

    Ok(())
}
