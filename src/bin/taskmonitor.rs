use std::sync::LazyLock;

use clap::{Args, Parser, Subcommand};
use regex::Regex;

use taskmonitor::date_util::parse_date;
use taskmonitor::report::{parse_columns, DEFAULT_COLUMNS};
use taskmonitor::{
    Database, ImportDocument, Report, ReportFilter, ReportKind, ReportRequest, ReportRow,
    SelectedItem, TaskMonitor, TaskState, TaskTimestamp,
};

static RE_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<key>[^=]+)=(?P<column>[^=]+)$").unwrap());
static RE_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<name>[^=]+)=(?P<value>.*)$").unwrap());

#[derive(Parser)]
#[command(name = "taskmonitor", about = "Workbasket monitoring reports")]
struct Cli {
    /// Database path (default: ~/.taskmonitor/taskmonitor.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import workbaskets, classifications, tasks and holidays from JSON
    Import {
        /// Path to the JSON document
        file: String,
    },
    /// Print an age-bucketed report
    Report {
        /// workbasket, category, classification, detailed-classification,
        /// custom-field or timestamp
        kind: String,
        #[command(flatten)]
        report: ReportArgs,
        /// Show folded detail rows too
        #[arg(long)]
        expand: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the ids of the tasks behind selected report cells
    Select {
        /// Report kind, as for `report`
        kind: String,
        /// Cell as KEY[/KEY...]=COLUMN; COLUMN is an index or a column name
        #[arg(long = "cell", required = true)]
        cells: Vec<String>,
        #[command(flatten)]
        report: ReportArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the distinct values of a custom attribute
    CustomValues {
        /// Attribute name
        name: String,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Manage holidays
    Holiday {
        #[command(subcommand)]
        action: HolidayAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show store status
    Status,
}

#[derive(Args)]
struct FilterArgs {
    /// Only tasks in this workbasket id (repeatable)
    #[arg(long = "workbasket")]
    workbaskets: Vec<String>,
    /// Only tasks in this state (repeatable)
    #[arg(long = "state")]
    states: Vec<String>,
    /// Only tasks of this classification category (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,
    /// Only tasks with this classification id (repeatable)
    #[arg(long = "classification")]
    classifications: Vec<String>,
    /// Skip tasks with this classification id (repeatable)
    #[arg(long = "exclude-classification")]
    excluded_classifications: Vec<String>,
    /// Only tasks in this domain (repeatable)
    #[arg(long = "domain")]
    domains: Vec<String>,
    /// Only tasks whose custom attribute matches, as NAME=VALUE (repeatable)
    #[arg(long = "attr")]
    attributes: Vec<String>,
}

#[derive(Args)]
struct ReportArgs {
    #[command(flatten)]
    filter: FilterArgs,
    /// Column spec, e.g. "..0,0,1..5,5.."
    #[arg(long, default_value = DEFAULT_COLUMNS)]
    columns: String,
    /// Age in working days instead of calendar days
    #[arg(long)]
    working_days: bool,
    /// Reference date (YYYY-MM-DD or "today")
    #[arg(long, default_value = "today")]
    date: String,
    /// Attribute keying a custom-field report
    #[arg(long)]
    custom_field: Option<String>,
    /// Timestamp a timestamp report covers (repeatable; default: all)
    #[arg(long = "timestamp")]
    timestamps: Vec<String>,
}

#[derive(Subcommand)]
enum HolidayAction {
    /// Declare a date a holiday
    Add {
        /// YYYY-MM-DD
        date: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a holiday
    Remove { date: String },
    /// List holidays
    List,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

impl FilterArgs {
    fn to_filter(&self) -> anyhow::Result<ReportFilter> {
        let mut filter = ReportFilter::new();
        for id in &self.workbaskets {
            filter = filter.workbasket(id);
        }
        for state in &self.states {
            filter = filter.state(TaskState::parse(state)?);
        }
        for category in &self.categories {
            filter = filter.category(category);
        }
        for id in &self.classifications {
            filter = filter.classification(id);
        }
        for id in &self.excluded_classifications {
            filter = filter.exclude_classification(id);
        }
        for domain in &self.domains {
            filter = filter.domain(domain);
        }
        for attr in &self.attributes {
            let caps = RE_ATTR
                .captures(attr)
                .ok_or_else(|| anyhow::anyhow!("expected NAME=VALUE, got '{attr}'"))?;
            filter = filter.custom_attribute(&caps["name"], &caps["value"]);
        }
        Ok(filter)
    }
}

impl ReportArgs {
    fn to_request(&self, kind: &str) -> anyhow::Result<ReportRequest> {
        let kind = ReportKind::parse(kind)?;
        let timestamps = self
            .timestamps
            .iter()
            .map(|ts| TaskTimestamp::parse(ts))
            .collect::<taskmonitor::Result<Vec<_>>>()?;

        let mut request = ReportRequest::new(kind, parse_date(&self.date)?)
            .filter(self.filter.to_filter()?)
            .columns(parse_columns(&self.columns)?)
            .working_days(self.working_days)
            .timestamps(timestamps);
        if let Some(name) = &self.custom_field {
            request = request.custom_field(name);
        }
        Ok(request)
    }
}

/// Parse `KEY[/KEY...]=COLUMN` against the request's columns.
fn parse_cell(cell: &str, request: &ReportRequest) -> anyhow::Result<SelectedItem> {
    let caps = RE_CELL
        .captures(cell)
        .ok_or_else(|| anyhow::anyhow!("expected KEY[/KEY...]=COLUMN, got '{cell}'"))?;
    let column_ref = &caps["column"];
    let column = match column_ref.parse::<usize>() {
        Ok(index) => index,
        Err(_) => request
            .columns
            .iter()
            .position(|h| h.display_name == column_ref)
            .ok_or_else(|| anyhow::anyhow!("no column named '{column_ref}'"))?,
    };
    Ok(SelectedItem::new(caps["key"].split('/'), column))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };
    let monitor = TaskMonitor::new(db);

    match cli.command {
        Commands::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let doc = ImportDocument::from_json(&json)?;
            let report = monitor.import(doc).await?;
            println!(
                "Imported {} workbaskets, {} classifications, {} tasks, {} holidays.",
                report.workbaskets, report.classifications, report.tasks, report.holidays
            );
        }
        Commands::Report {
            kind,
            report,
            expand,
            json,
        } => {
            let request = report.to_request(&kind)?;
            let report = monitor.report(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, expand);
            }
        }
        Commands::Select {
            kind,
            cells,
            report,
            json,
        } => {
            let request = report.to_request(&kind)?;
            let selections = cells
                .iter()
                .map(|cell| parse_cell(cell, &request))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let ids = monitor
                .list_task_ids_for_selected_items(&request, &selections)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ids)?);
            } else if ids.is_empty() {
                println!("No tasks found.");
            } else {
                for id in &ids {
                    println!("{id}");
                }
                println!("\n{} tasks", ids.len());
            }
        }
        Commands::CustomValues { name, filter } => {
            let values = monitor
                .list_custom_attribute_values_for_custom_attribute_name(
                    &filter.to_filter()?,
                    &name,
                )
                .await?;
            for value in &values {
                println!("{value}");
            }
        }
        Commands::Holiday { action } => handle_holiday(&monitor, action).await?,
        Commands::Config { action } => handle_config(&monitor, action).await?,
        Commands::Status => print_status(&monitor).await?,
    }

    Ok(())
}

fn print_report(report: &Report, expand: bool) {
    let visible = visible_rows(report, expand);
    let label_width = visible
        .iter()
        .copied()
        .chain(std::iter::once(report.sum_row()))
        .map(|row| row.depth * 2 + row.label().len())
        .chain(std::iter::once(report.dimensions.join("/").len()))
        .max()
        .unwrap_or(0);
    let widths: Vec<usize> = report
        .column_headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            visible
                .iter()
                .map(|row| row.cells[i].to_string().len())
                .chain([h.display_name.len(), report.sum_row().cells[i].to_string().len()])
                .max()
                .unwrap_or(1)
        })
        .collect();

    let unit = if report.working_days {
        "working days"
    } else {
        "days"
    };
    println!(
        "{} report, {} on {}",
        report.kind, unit, report.reference_date
    );

    let mut header = format!("{:<label_width$}", report.dimensions.join("/"));
    for (h, w) in report.column_headers.iter().zip(&widths) {
        header.push_str(&format!("  {:>w$}", h.display_name));
    }
    header.push_str("  total");
    println!("{header}");

    for row in visible {
        print_row(row, label_width, &widths);
    }
    print_row(report.sum_row(), label_width, &widths);

    if report.without_age > 0 {
        println!("\n{} tasks without age", report.without_age);
    }
    if report.unbucketed > 0 {
        println!("{} tasks outside every column", report.unbucketed);
    }
}

/// Rows in display order. Folded rows and their subtrees are skipped unless
/// `expand` is set.
fn visible_rows(report: &Report, expand: bool) -> Vec<&ReportRow> {
    let mut out = Vec::new();
    let mut stack: Vec<&ReportRow> = report.rows().collect();
    stack.reverse();
    while let Some(row) = stack.pop() {
        if !expand && !row.display {
            continue;
        }
        out.push(row);
        let mut children: Vec<&ReportRow> = report.children(row).collect();
        children.reverse();
        stack.extend(children);
    }
    out
}

fn print_row(row: &ReportRow, label_width: usize, widths: &[usize]) {
    let label = format!("{}{}", "  ".repeat(row.depth), row.label());
    let mut line = format!("{label:<label_width$}");
    for (cell, w) in row.cells.iter().zip(widths) {
        line.push_str(&format!("  {cell:>w$}"));
    }
    line.push_str(&format!("  {}", row.total));
    println!("{line}");
}

async fn handle_holiday(monitor: &TaskMonitor, action: HolidayAction) -> anyhow::Result<()> {
    match action {
        HolidayAction::Add { date, name } => {
            let date = parse_date(&date)?;
            monitor.holiday_add(date, name.as_deref()).await?;
            println!("Added holiday {date}.");
        }
        HolidayAction::Remove { date } => {
            let date = parse_date(&date)?;
            if monitor.holiday_remove(date).await? {
                println!("Removed holiday {date}.");
            } else {
                println!("{date} is not a holiday.");
            }
        }
        HolidayAction::List => {
            let holidays = monitor.holiday_list().await?;
            if holidays.is_empty() {
                println!("No holidays configured.");
            }
            for h in &holidays {
                match &h.name {
                    Some(name) => println!("{}  {name}", h.date),
                    None => println!("{}", h.date),
                }
            }
        }
    }
    Ok(())
}

async fn handle_config(monitor: &TaskMonitor, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match monitor.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            monitor.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let entries = monitor.config_list().await?;
            if entries.is_empty() {
                println!("No config values set.");
            }
            for (k, v) in &entries {
                println!("{k} = {v}");
            }
        }
    }
    Ok(())
}

async fn print_status(monitor: &TaskMonitor) -> anyhow::Result<()> {
    let stats = monitor.status().await?;
    let calendar = monitor.calendar().await?;
    let weekend: Vec<String> = calendar.weekend().iter().map(|d| d.to_string()).collect();

    println!("Task Store Status");
    println!("  Workbaskets:     {}", stats.workbaskets);
    println!("  Classifications: {}", stats.classifications);
    println!("  Tasks:           {}", stats.tasks);
    println!("  Holidays:        {}", stats.holidays);
    println!("  Weekend:         {}", weekend.join(", "));
    Ok(())
}
