use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use common::{
    HistoryRow, IntervalUnit, JobId, JobSpec, JobView, Reply, Request, Response, ScriptType,
    Template,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Daemon socket
    #[arg(long, env = "SCRIPTSCHED_SOCKET")]
    socket: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ScriptSource {
    /// Read the script from this file
    #[arg(long, conflicts_with = "inline")]
    file: Option<PathBuf>,
    /// Script text given directly
    #[arg(long)]
    inline: Option<String>,
    /// Script type (py, sh, php, js, rb, pl, ps1, bat, cmd, r, lua, go, sql);
    /// taken from the file extension when omitted
    #[arg(short = 't', long = "type")]
    script_type: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new job
    Add {
        /// Name of the job
        #[arg(short, long)]
        name: String,
        #[command(flatten)]
        source: ScriptSource,
        /// Every X interval (e.g. "5m", "2h", "1d")
        #[arg(short, long)]
        every: String,
        /// Create the job disabled
        #[arg(long)]
        disabled: bool,
        /// Default arguments for manual runs
        #[arg(long)]
        args: Option<String>,
    },
    /// Change a job; omitted fields keep their current value
    Update {
        id: String,
        #[arg(short, long)]
        name: Option<String>,
        #[command(flatten)]
        source: ScriptSource,
        #[arg(short, long)]
        every: Option<String>,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        #[arg(long)]
        args: Option<String>,
    },
    /// Enable a disabled job or disable an enabled one
    Toggle { id: String },
    /// Remove a job and its script
    Remove { id: String },
    /// List all jobs
    List,
    /// Get job details
    Get { id: String },
    /// Print a job's script
    Script { id: String },
    /// Run a job now
    Run {
        id: String,
        /// Arguments for this run; the job's defaults when omitted
        #[arg(long)]
        args: Option<String>,
    },
    /// View execution history, newest first
    History {
        /// Only runs of jobs with this name
        #[arg(long)]
        job: Option<String>,
        /// Write CSV to stdout instead of a table
        #[arg(long)]
        csv: bool,
    },
    /// List templates
    Templates,
    /// Save a template, replacing one with the same file name
    TemplateSave {
        #[arg(short, long)]
        name: String,
        #[command(flatten)]
        source: ScriptSource,
        #[arg(short, long, default_value = "1m")]
        every: String,
        /// Jobs created from the template start enabled
        #[arg(long)]
        enabled: bool,
    },
    /// Delete a template
    TemplateDelete { name: String },
    /// Create a job from a template
    FromTemplate {
        template: String,
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        args: Option<String>,
    },
    /// Run due jobs now
    Check,
    /// Job counts and the latest executions
    Summary,
    /// Prometheus metrics
    Metrics,
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(path: &PathBuf) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("Cannot connect to daemon at {:?}", path))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    /// Sends one request. Warnings are printed; an error response becomes `Err`.
    async fn send(&mut self, req: &Request) -> Result<Response> {
        let mut bytes = serde_json::to_vec(req)?;
        bytes.push(b'\n');
        self.writer.write_all(&bytes).await?;

        let line = self
            .lines
            .next_line()
            .await?
            .ok_or_else(|| anyhow!("Daemon closed the connection"))?;
        let reply: Reply = serde_json::from_str(&line)?;
        for warning in &reply.warnings {
            eprintln!("Warning: {}", warning);
        }
        match reply.response {
            Response::Error(e) => bail!(e),
            other => Ok(other),
        }
    }
}

impl ScriptSource {
    /// Script text and type. `current` supplies whatever was not given.
    fn resolve(&self, current: Option<(String, ScriptType)>) -> Result<(String, ScriptType)> {
        let content = match (&self.file, &self.inline) {
            (Some(path), _) => Some(
                std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?,
            ),
            (None, Some(text)) => Some(text.clone()),
            (None, None) => None,
        };
        let script_type = self.script_type.as_ref().map(|t| ScriptType::from(t.clone())).or_else(|| {
            self.file
                .as_ref()
                .and_then(|p| p.extension())
                .map(|e| ScriptType::from(e.to_string_lossy().into_owned()))
        });

        let (current_content, current_type) = match current {
            Some((c, t)) => (Some(c), Some(t)),
            None => (None, None),
        };
        let content = content
            .or(current_content)
            .ok_or_else(|| anyhow!("Must specify --file or --inline"))?;
        let script_type = script_type
            .or(current_type)
            .ok_or_else(|| anyhow!("Must specify --type"))?;
        if !script_type.is_supported() {
            bail!(
                "Unsupported script type: {} (expected one of {})",
                script_type,
                ScriptType::EXTENSIONS.join(", ")
            );
        }
        Ok((content, script_type))
    }
}

fn interval(every: &str) -> Result<(u64, IntervalUnit)> {
    common::parse_interval(every)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket = cli
        .socket
        .unwrap_or_else(|| PathBuf::from(common::default_socket_path()));
    let mut client = Client::connect(&socket).await?;

    match cli.command {
        Commands::Add { name, source, every, disabled, args } => {
            let (script_content, script_type) = source.resolve(None)?;
            let (interval_value, interval_unit) = interval(&every)?;
            let spec = JobSpec {
                name,
                script_content,
                script_type,
                interval_value,
                interval_unit,
                enabled: !disabled,
                arguments: args,
            };
            if let Response::Created(id) = client.send(&Request::CreateJob(spec)).await? {
                println!("Created job {}", id);
            }
        }
        Commands::Update { id, name, source, every, enable, disable, args } => {
            let id = JobId(id);
            let current = expect_job(client.send(&Request::GetJob(id.clone())).await?)?;
            let script = expect_script(client.send(&Request::GetScript(id.clone())).await?)?;
            let (script_content, script_type) =
                source.resolve(Some((script, current.job.script_type.clone())))?;
            let (interval_value, interval_unit) = match every {
                Some(every) => interval(&every)?,
                None => (current.job.interval_value, current.job.interval_unit.clone()),
            };
            let spec = JobSpec {
                name: name.unwrap_or(current.job.name.clone()),
                script_content,
                script_type,
                interval_value,
                interval_unit,
                enabled: if enable { true } else if disable { false } else { current.job.enabled },
                arguments: args.or(current.job.script_arguments.clone()),
            };
            client.send(&Request::UpdateJob(id, spec)).await?;
            println!("Success");
        }
        Commands::Toggle { id } => {
            let view = expect_job(client.send(&Request::ToggleJob(JobId(id))).await?)?;
            println!(
                "Job {} is now {}",
                view.job.name,
                if view.job.enabled { "enabled" } else { "disabled" }
            );
        }
        Commands::Remove { id } => {
            client.send(&Request::RemoveJob(JobId(id))).await?;
            println!("Success");
        }
        Commands::List => {
            if let Response::JobList(jobs) = client.send(&Request::ListJobs).await? {
                print_jobs(&jobs);
            }
        }
        Commands::Get { id } => {
            let view = expect_job(client.send(&Request::GetJob(JobId(id))).await?)?;
            print_job(&view);
        }
        Commands::Script { id } => {
            print!("{}", expect_script(client.send(&Request::GetScript(JobId(id))).await?)?);
        }
        Commands::Run { id, args } => {
            let req = Request::RunJob { id: JobId(id), arguments: args };
            if let Response::RunResult { success, output } = client.send(&req).await? {
                if success {
                    println!("Job executed successfully!");
                } else {
                    println!("Job execution failed!");
                }
                if output.is_empty() {
                    println!("(no output)");
                } else {
                    print!("{}", output);
                }
                if !success {
                    std::io::Write::flush(&mut std::io::stdout())?;
                    std::process::exit(1);
                }
            }
        }
        Commands::History { job, csv } => {
            if let Response::HistoryList(rows) = client.send(&Request::GetHistory { job_name: job }).await? {
                if csv {
                    write_history_csv(&rows)?;
                } else {
                    print_history(&rows);
                }
            }
        }
        Commands::Templates => {
            if let Response::TemplateList(templates) = client.send(&Request::ListTemplates).await? {
                print_templates(&templates);
            }
        }
        Commands::TemplateSave { name, source, every, enabled } => {
            let (script_content, script_type) = source.resolve(None)?;
            let (interval_value, interval_unit) = interval(&every)?;
            let template = Template {
                name,
                script_type,
                script_content,
                interval_value,
                interval_unit,
                enabled,
            };
            client.send(&Request::SaveTemplate(template)).await?;
            println!("Success");
        }
        Commands::TemplateDelete { name } => {
            client.send(&Request::DeleteTemplate(name)).await?;
            println!("Success");
        }
        Commands::FromTemplate { template, name, args } => {
            let req = Request::CreateFromTemplate { template, name, arguments: args };
            if let Response::Created(id) = client.send(&req).await? {
                println!("Created job {}", id);
            }
        }
        Commands::Check => {
            if let Response::Checked { executed } = client.send(&Request::CheckScheduled).await? {
                println!("Ran {} due job(s)", executed);
            }
        }
        Commands::Summary => {
            if let Response::Summary(summary) = client.send(&Request::Summary).await? {
                println!("Total Jobs:    {}", summary.total_jobs);
                println!("Active Jobs:   {}", summary.active_jobs);
                println!("Inactive Jobs: {}", summary.inactive_jobs);
                println!();
                println!("Recently Executed Jobs:");
                if summary.recent.is_empty() {
                    println!("  No recently executed jobs yet.");
                } else {
                    print_history(&summary.recent);
                }
            }
        }
        Commands::Metrics => {
            if let Response::Metrics(text) = client.send(&Request::Metrics).await? {
                print!("{}", text);
            }
        }
    }

    Ok(())
}

fn expect_job(resp: Response) -> Result<JobView> {
    match resp {
        Response::JobDetail(view) => Ok(view),
        other => Err(anyhow!("Unexpected response: {:?}", other)),
    }
}

fn expect_script(resp: Response) -> Result<String> {
    match resp {
        Response::Script(text) => Ok(text),
        other => Err(anyhow!("Unexpected response: {:?}", other)),
    }
}

fn local(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn preview(text: &str, width: usize) -> String {
    let first = text.lines().next().unwrap_or("");
    if first.chars().count() > width {
        format!("{}...", first.chars().take(width).collect::<String>())
    } else {
        first.to_string()
    }
}

fn print_jobs(jobs: &[JobView]) {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Type", "Interval", "Enabled", "Last Run", "Next Run"]);
    for view in jobs {
        let job = &view.job;
        table.add_row(vec![
            job.id.to_string(),
            job.name.clone(),
            job.script_type.to_string(),
            format!("{} {}", job.interval_value, job.interval_unit),
            if job.enabled { "yes" } else { "no" }.to_string(),
            job.last_run.as_ref().map_or_else(|| "Never".to_string(), local),
            view.next_run.as_ref().map_or_else(|| "-".to_string(), local),
        ]);
    }
    println!("{table}");
}

fn print_job(view: &JobView) {
    let job = &view.job;
    println!("Job Details:");
    println!("  ID:        {}", job.id);
    println!("  Name:      {}", job.name);
    println!("  Type:      {}", job.script_type);
    println!("  Script:    {}", job.script_path.display());
    println!("  Interval:  {} {} ({}s)", job.interval_value, job.interval_unit, job.interval_seconds);
    println!("  Enabled:   {}", job.enabled);
    println!("  Created:   {}", local(&job.created_at));
    println!("  Last Run:  {}", job.last_run.as_ref().map_or_else(|| "Never".to_string(), local));
    println!("  Next Run:  {}", view.next_run.as_ref().map_or_else(|| "-".to_string(), local));
    println!("  Arguments: {}", job.default_arguments());
}

fn print_history(rows: &[HistoryRow]) {
    let mut table = Table::new();
    table.set_header(vec!["Job Name", "Timestamp", "Status", "Arguments", "Output (Preview)"]);
    for row in rows {
        let text = if row.entry.success { &row.entry.output } else { &row.entry.error };
        table.add_row(vec![
            row.job_name.clone(),
            local(&row.entry.timestamp),
            row.entry.status().to_string(),
            preview(&row.entry.arguments, 30),
            preview(text, 40),
        ]);
    }
    println!("{table}");
}

fn write_history_csv(rows: &[HistoryRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    wtr.write_record(["job_id", "job_name", "timestamp", "success", "arguments", "output", "error"])?;
    for row in rows {
        let timestamp = row.entry.timestamp.to_rfc3339();
        wtr.write_record([
            row.entry.job_id.0.as_str(),
            row.job_name.as_str(),
            timestamp.as_str(),
            if row.entry.success { "true" } else { "false" },
            row.entry.arguments.as_str(),
            row.entry.output.as_str(),
            row.entry.error.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn print_templates(templates: &[Template]) {
    if templates.is_empty() {
        println!("No templates found.");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec!["Name", "Type", "Interval", "Enabled by default", "Script (Preview)"]);
    for t in templates {
        table.add_row(vec![
            t.name.clone(),
            t.script_type.to_string(),
            format!("{} {}", t.interval_value, t.interval_unit),
            t.enabled.to_string(),
            preview(&t.script_content, 40),
        ]);
    }
    println!("{table}");
}
