//! Local command-line front end for the isotope decay calculator.
//!
//! # Responsibility
//! - Map subcommands onto catalog and order service calls.
//! - Carry caller identity as plain flags; no authentication happens here.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use isocalc_core::db::open_db;
use isocalc_core::{
    default_log_level, init_logging, AddItemOutcome, CalculationOrder, Caller, CatalogService,
    IsotopeDraft, ItemMassUpdate, OrderService, SqliteIsotopeRepository, SqliteOrderRepository,
};
use log::info;
use rusqlite::Connection;
use uuid::Uuid;

/// Isotope decay calculator.
#[derive(Parser)]
#[command(name = "isocalc")]
#[command(version, about = "Residual activity of radioactive isotopes over time.")]
struct Cli {
    /// SQLite database file.
    #[arg(long, env = "ISOCALC_DB", default_value = "isocalc.sqlite3", global = true)]
    db: PathBuf,

    /// Log level (trace|debug|info|warn|error).
    #[arg(long, env = "ISOCALC_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files. Logging is off when unset.
    #[arg(long, env = "ISOCALC_LOG_DIR", global = true)]
    log_dir: Option<String>,

    /// Identity of the acting user.
    #[arg(long, env = "ISOCALC_USER", global = true)]
    user: Option<Uuid>,

    /// Act with moderator capability.
    #[arg(long, global = true)]
    moderator: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Isotope catalog subcommands.
    Isotope {
        #[command(subcommand)]
        action: IsotopeAction,
    },
    /// Current draft subcommands.
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },
    /// Calculation order subcommands.
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum IsotopeAction {
    /// Add an isotope to the catalog. Moderator only.
    Add(IsotopeAddArgs),
    /// List active isotopes, or every isotope with `--all`.
    List {
        /// Include inactive isotopes. Moderator only.
        #[arg(long)]
        all: bool,
    },
    /// Show one isotope.
    Show { id: Uuid },
    /// Hide an isotope from the catalog. Moderator only.
    Deactivate { id: Uuid },
}

#[derive(Args)]
struct IsotopeAddArgs {
    /// Display name, e.g. `Carbon-14`.
    name: String,

    /// Half-life in years.
    #[arg(long)]
    half_life: f64,

    /// Atomic mass in unified atomic mass units.
    #[arg(long)]
    atomic_mass: f64,

    #[arg(long, default_value = "")]
    decay_type: String,

    #[arg(long, default_value = "")]
    application: String,

    #[arg(long, default_value = "")]
    description: String,

    /// Absolute http(s) URL of an illustration.
    #[arg(long)]
    image_url: Option<String>,
}

#[derive(Subcommand)]
enum DraftAction {
    /// Add an isotope to the draft, creating the draft when needed.
    Add { isotope: Uuid },
    /// Remove one item from the draft.
    Remove { item: Uuid },
    /// Show the draft id and its item count.
    Show,
}

#[derive(Subcommand)]
enum OrderAction {
    /// Show an order with its items.
    Show { id: Uuid },
    /// List visible orders.
    List,
    /// Recompute residual activity for submitted items.
    Calc(OrderCalcArgs),
    /// Submit a draft for moderation.
    Form { id: Uuid },
    /// Soft-delete an order.
    Delete { id: Uuid },
    /// Complete a formed order. Moderator only.
    Complete { id: Uuid },
    /// Reject a draft order. Moderator only.
    Reject { id: Uuid },
}

#[derive(Args)]
struct OrderCalcArgs {
    id: Uuid,

    /// Elapsed time in years.
    #[arg(long)]
    elapsed: f64,

    /// Item mass as `<item-uuid>=<grams>`. Repeat for each item.
    #[arg(long = "mass", value_parser = parse_mass_update)]
    masses: Vec<ItemMassUpdate>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir).map_err(|err| anyhow!(err))?;
    }

    let mut conn = open_db(&cli.db)
        .with_context(|| format!("failed to open database {}", cli.db.display()))?;
    info!("event=cli_start module=cli status=ok moderator={}", cli.moderator);

    match &cli.command {
        Commands::Isotope { action } => run_isotope(&cli, &conn, action),
        Commands::Draft { action } => run_draft(&cli, &mut conn, action),
        Commands::Order { action } => run_order(&cli, &mut conn, action),
    }
}

impl Cli {
    fn caller(&self) -> Result<Caller> {
        let Some(user_id) = self.user else {
            bail!("--user <uuid> is required for this command");
        };
        Ok(Caller {
            user_id,
            is_moderator: self.moderator,
        })
    }
}

fn run_isotope(cli: &Cli, conn: &Connection, action: &IsotopeAction) -> Result<()> {
    let service = CatalogService::new(SqliteIsotopeRepository::try_new(conn)?);

    match action {
        IsotopeAction::Add(args) => {
            let draft = IsotopeDraft {
                name: args.name.clone(),
                description: args.description.clone(),
                half_life_years: args.half_life,
                atomic_mass: args.atomic_mass,
                decay_type: args.decay_type.clone(),
                application: args.application.clone(),
                image_url: args.image_url.clone(),
            };
            let isotope = service
                .create_isotope(&cli.caller()?, &draft)
                .context("failed to add isotope")?;
            println!("{}", isotope.id);
        }
        IsotopeAction::List { all } => {
            let isotopes = if *all {
                service.list_all_isotopes(&cli.caller()?)?
            } else {
                service.list_isotopes()?
            };
            for isotope in isotopes {
                println!(
                    "{}  {:<16} T1/2={} y  mass={}{}",
                    isotope.id,
                    isotope.name,
                    isotope.half_life_years,
                    isotope.atomic_mass,
                    if isotope.is_active { "" } else { "  (inactive)" }
                );
            }
        }
        IsotopeAction::Show { id } => {
            let isotope = service.get_isotope(*id)?;
            println!("id:          {}", isotope.id);
            println!("name:        {}", isotope.name);
            println!("half-life:   {} y", isotope.half_life_years);
            println!("atomic mass: {}", isotope.atomic_mass);
            println!("decay type:  {}", isotope.decay_type);
            println!("application: {}", isotope.application);
            println!("description: {}", isotope.description);
            if let Some(url) = &isotope.image_url {
                println!("image:       {url}");
            }
        }
        IsotopeAction::Deactivate { id } => {
            service
                .set_isotope_active(&cli.caller()?, *id, false)
                .with_context(|| format!("failed to deactivate isotope {id}"))?;
            println!("deactivated {id}");
        }
    }
    Ok(())
}

fn run_draft(cli: &Cli, conn: &mut Connection, action: &DraftAction) -> Result<()> {
    let caller = cli.caller()?;
    let mut service = OrderService::new(SqliteOrderRepository::try_new(conn)?);

    match action {
        DraftAction::Add { isotope } => match service.add_isotope(&caller, *isotope)? {
            AddItemOutcome::Added(item) => {
                println!("added item {} to order {}", item.id, item.order_id);
            }
            AddItemOutcome::AlreadyPresent(item) => {
                println!(
                    "isotope already in order {} as item {}",
                    item.order_id, item.id
                );
            }
        },
        DraftAction::Remove { item } => {
            service.remove_item(&caller, *item)?;
            println!("removed item {item}");
        }
        DraftAction::Show => match service.draft_summary(&caller)? {
            Some(summary) => println!("{}  items={}", summary.order_id, summary.item_count),
            None => println!("no draft"),
        },
    }
    Ok(())
}

fn run_order(cli: &Cli, conn: &mut Connection, action: &OrderAction) -> Result<()> {
    let caller = cli.caller()?;
    let mut service = OrderService::new(SqliteOrderRepository::try_new(conn)?);

    match action {
        OrderAction::Show { id } => {
            let detail = service.get_order(&caller, *id)?;
            print_order(&detail.order);
            for view in detail.items {
                println!(
                    "  {}  {:<16} T1/2={} y  m0={} g  A={}",
                    view.item.id,
                    view.isotope_name,
                    view.half_life_years,
                    view.item.initial_mass_grams,
                    format_activity(view.item.remaining_activity)
                );
            }
        }
        OrderAction::List => {
            for order in service.list_orders(&caller)? {
                print_order(&order);
            }
        }
        OrderAction::Calc(args) => {
            let order = service
                .recompute_order(&caller, args.id, args.elapsed, &args.masses)
                .with_context(|| format!("recompute of order {} was rolled back", args.id))?;
            print_order(&order);
        }
        OrderAction::Form { id } => print_order(&service.form_order(&caller, *id)?),
        OrderAction::Delete { id } => {
            let affected = service.soft_delete_order(&caller, *id)?;
            println!("deleted {affected} order(s)");
        }
        OrderAction::Complete { id } => print_order(&service.complete_order(&caller, *id)?),
        OrderAction::Reject { id } => print_order(&service.reject_order(&caller, *id)?),
    }
    Ok(())
}

fn print_order(order: &CalculationOrder) {
    println!(
        "{}  {:<9} client={} t={} y  total={}",
        order.id,
        order.status.as_str(),
        order.client_id,
        order.time_elapsed_years,
        format_activity(order.total_activity)
    );
}

fn format_activity(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |activity| format!("{activity:.6}"))
}

fn parse_mass_update(value: &str) -> Result<ItemMassUpdate, String> {
    let (item, grams) = value
        .split_once('=')
        .ok_or_else(|| format!("expected <item-uuid>=<grams>, got `{value}`"))?;
    let item_id = Uuid::parse_str(item.trim()).map_err(|err| format!("invalid item id: {err}"))?;
    let initial_mass_grams = grams
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid mass `{grams}`: {err}"))?;
    Ok(ItemMassUpdate {
        item_id,
        initial_mass_grams,
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_mass_update, Cli};
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn mass_update_parses_item_and_grams() {
        let update = parse_mass_update("67e55044-10b1-426f-9247-bb680e5fe0c8=2.5").unwrap();
        assert_eq!(update.initial_mass_grams, 2.5);
        assert_eq!(
            update.item_id.to_string(),
            "67e55044-10b1-426f-9247-bb680e5fe0c8"
        );
    }

    #[test]
    fn mass_update_rejects_missing_separator() {
        assert!(parse_mass_update("67e55044-10b1-426f-9247-bb680e5fe0c8").is_err());
        assert!(parse_mass_update("not-a-uuid=1.0").is_err());
    }
}
