use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use collection_ledger::{
    add_consultant, collectibles_for_period, discard_period, export_period, import_from_source,
    list_periods, number_to_words, open_database, parse_period_date, pending_collectibles,
    seed_admin, settle_and_print, Config, DirectorySink, ExportOptions, ExportOutcome, FileSource,
    Payment, PaymentType, PrintOutcome, StaticConnection, TextReceiptPrinter,
};

const USAGE: &str = "usage: collection-ledger [--config FILE] <command>

commands:
  init                                    create the database and seed admin
  import <YYYY-MM-DD> <file.csv>          import a batch as a new period
  periods                                 list periods
  pending <period_id>                     unprinted accounts of an open period
  show <period_id>                        every account of a period
  pay <period_id> <account> <cash|cheque> <amount> <agent> [cheque_no]
  export <period_id>                      export and seal a settled period
  discard <period_id>                     remove an open period and its accounts
  add-consultant <name> <area> <password>
  words <n>                               write a whole amount in words";

fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();

    let config_path = match args.iter().position(|a| a == "--config") {
        Some(idx) => {
            if idx + 1 >= args.len() {
                bail!("--config needs a file path\n\n{}", USAGE);
            }
            let path = PathBuf::from(args.remove(idx + 1));
            args.remove(idx);
            Some(path)
        }
        None => None,
    };

    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config);

    let Some(command) = args.first().cloned() else {
        bail!("{}", USAGE);
    };
    let rest = &args[1..];

    if command == "words" {
        let n: u64 = arg(rest, 0, "n")?.parse().context("n must be a whole number")?;
        println!("{}", number_to_words(n));
        return Ok(());
    }

    let mut conn = open_database(&config.database.path)
        .with_context(|| format!("Failed to open {}", config.database.path.display()))?;

    match command.as_str() {
        "init" => run_init(&conn, &config),
        "import" => run_import(&mut conn, rest),
        "periods" => run_periods(&conn),
        "pending" => run_list(&conn, rest, true),
        "show" => run_list(&conn, rest, false),
        "pay" => run_pay(&mut conn, rest),
        "export" => run_export(&mut conn, &config, rest),
        "discard" => {
            let period_id = id_arg(rest, 0, "period_id")?;
            let removed = discard_period(&mut conn, period_id)?;
            println!("🗑️  Period {} discarded ({} accounts removed)", period_id, removed);
            Ok(())
        }
        "add-consultant" => {
            let id = add_consultant(
                &conn,
                arg(rest, 0, "name")?,
                arg(rest, 1, "area")?,
                arg(rest, 2, "password")?,
            )?;
            println!("✓ Consultant #{} added", id);
            Ok(())
        }
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn arg<'a>(args: &'a [String], idx: usize, name: &str) -> Result<&'a str> {
    match args.get(idx) {
        Some(value) => Ok(value.as_str()),
        None => bail!("missing <{}>\n\n{}", name, USAGE),
    }
}

fn id_arg(args: &[String], idx: usize, name: &str) -> Result<i64> {
    arg(args, idx, name)?
        .parse()
        .with_context(|| format!("<{}> must be a number", name))
}

fn run_init(conn: &Connection, config: &Config) -> Result<()> {
    if seed_admin(conn, &config.admin)? {
        println!("✓ Admin account '{}' created", config.admin.username);
    }
    println!("✓ Database ready at {}", config.database.path.display());
    Ok(())
}

fn run_import(conn: &mut Connection, args: &[String]) -> Result<()> {
    let date = parse_period_date(arg(args, 0, "date")?)?;
    let mut source = FileSource::new(arg(args, 1, "file")?);

    match import_from_source(conn, date, &mut source)? {
        Some(summary) => println!(
            "✅ Imported {} collectibles into period {} ({})",
            summary.rows, summary.period_id, summary.date
        ),
        None => println!("Import cancelled"),
    }
    Ok(())
}

fn run_periods(conn: &Connection) -> Result<()> {
    for period in list_periods(conn)? {
        let status = if period.is_exported { "EXPORTED" } else { "OPEN" };
        println!("{:>5}  {}  {}", period.period_id, period.date, status);
    }
    Ok(())
}

fn run_list(conn: &Connection, args: &[String], only_pending: bool) -> Result<()> {
    let period_id = id_arg(args, 0, "period_id")?;
    let rows = if only_pending {
        pending_collectibles(conn, period_id)?
    } else {
        collectibles_for_period(conn, period_id)?
    };

    for c in &rows {
        println!(
            "{:>10}  {:<24} balance {:>12.2}  due {:>10.2}  {}",
            c.account_number,
            c.name,
            c.remaining_balance,
            c.daily_due,
            if c.is_printed { "✓ printed" } else { "pending" }
        );
    }
    println!("{} accounts", rows.len());
    Ok(())
}

fn run_pay(conn: &mut Connection, args: &[String]) -> Result<()> {
    let period_id = id_arg(args, 0, "period_id")?;
    let account_number = id_arg(args, 1, "account")?;
    let payment_type = match PaymentType::parse(arg(args, 2, "cash|cheque")?) {
        Some(t @ (PaymentType::Cash | PaymentType::Cheque)) => t,
        _ => bail!("payment type must be cash or cheque"),
    };
    let amount_paid: f64 = arg(args, 3, "amount")?
        .parse()
        .context("<amount> must be a number")?;

    let payment = Payment {
        payment_type,
        cheque_number: args.get(5).cloned().unwrap_or_default(),
        amount_paid,
        creditors_name: arg(args, 4, "agent")?.to_string(),
    };

    let mut printer = TextReceiptPrinter::new(std::io::stdout());
    let settlement = settle_and_print(
        conn,
        period_id,
        account_number,
        &payment,
        &mut printer,
        &StaticConnection(true),
    )?;

    println!(
        "✅ Account {} settled, new balance {:.2}",
        account_number, settlement.receipt.new_balance
    );
    if let PrintOutcome::Failed(reason) = settlement.print {
        eprintln!("⚠️  Receipt not printed ({}); payment is saved, reprint manually", reason);
    }
    Ok(())
}

fn run_export(conn: &mut Connection, config: &Config, args: &[String]) -> Result<()> {
    let period_id = id_arg(args, 0, "period_id")?;
    let options = ExportOptions::resolve(conn, &config.export)?;
    let mut sink = DirectorySink::new(&config.export.output_dir);

    match export_period(conn, period_id, &mut sink, &options)? {
        ExportOutcome::Exported(record) => println!(
            "✅ Period {} exported: {} ({} rows, sha256 {})",
            period_id,
            sink.path_for(&record.filename).display(),
            record.row_count,
            record.sha256
        ),
        ExportOutcome::Cancelled => println!("Export cancelled, period {} is still open", period_id),
    }
    Ok(())
}
