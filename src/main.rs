// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;

use whose_round::{
    add_member, export_rounds_csv, get_group, get_rounds_for_group, insert_group, insert_round,
    list_groups, open_database, register, telemetry, NewGroup, NewRound, NewUser,
    RotationResolver, Settings,
};

#[derive(Parser)]
#[command(name = "whose-round", version, about = "Keep track of whose turn it is to pay the round")]
struct Cli {
    /// SQLite database file (defaults to database.path from settings)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init,
    #[command(subcommand)]
    User(UserCommand),
    #[command(subcommand)]
    Group(GroupCommand),
    #[command(subcommand)]
    Member(MemberCommand),
    #[command(subcommand)]
    Round(RoundCommand),
    /// Show who pays the next round
    Next {
        group_id: i64,
        /// Also list this many upcoming turns
        #[arg(long)]
        upcoming: Option<usize>,
    },
    /// Interactive dashboard
    Ui,
}

#[derive(Subcommand)]
enum UserCommand {
    /// Register a user
    Add {
        email: String,
        username: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum GroupCommand {
    /// Create a group
    Create {
        name: String,
        #[arg(long)]
        created_by: i64,
    },
    /// List groups with their members
    List {
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Show one group in rotation order
    Show { group_id: i64 },
}

#[derive(Subcommand)]
enum MemberCommand {
    /// Append a user to a group's rotation
    Add { group_id: i64, user_id: i64 },
}

#[derive(Subcommand)]
enum RoundCommand {
    /// Record that someone paid
    Record(RecordArgs),
    /// Round history, newest first
    List { group_id: i64 },
    /// Write the round history to a CSV file
    Export { group_id: i64, path: PathBuf },
}

#[derive(Args)]
struct RecordArgs {
    group_id: i64,
    paid_by: i64,
    /// Amount in cents
    #[arg(long, default_value_t = 0)]
    amount: i64,
    #[arg(long)]
    notes: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;
    let db_path = cli.db.unwrap_or_else(|| settings.database.path.clone());

    if !matches!(cli.command, Command::Ui) {
        telemetry::init_logger(&settings.logging.level, settings.logging.json);
    }

    let conn = open_database(&db_path)
        .with_context(|| format!("Failed to open database at {:?}", db_path))?;

    match cli.command {
        Command::Init => println!("✓ Database ready at {:?}", db_path),
        Command::User(cmd) => run_user(&conn, cmd)?,
        Command::Group(cmd) => run_group(&conn, cmd)?,
        Command::Member(cmd) => run_member(&conn, cmd)?,
        Command::Round(cmd) => run_round(&conn, cmd)?,
        Command::Next { group_id, upcoming } => run_next(&conn, group_id, upcoming)?,
        Command::Ui => run_ui_mode(conn)?,
    }

    Ok(())
}

fn run_user(conn: &Connection, cmd: UserCommand) -> Result<()> {
    match cmd {
        UserCommand::Add { email, username, password } => {
            let user = register(conn, &NewUser::new(&email, &username, &password))?;
            println!("✓ User #{} {} <{}>", user.id, user.username, user.email);
        }
    }
    Ok(())
}

fn run_group(conn: &Connection, cmd: GroupCommand) -> Result<()> {
    match cmd {
        GroupCommand::Create { name, created_by } => {
            let group = insert_group(conn, &NewGroup::new(&name, created_by))?;
            println!("✓ Group #{} \"{}\"", group.id, group.name);
        }
        GroupCommand::List { skip, limit } => {
            let groups = list_groups(conn, skip, limit)?;
            if groups.is_empty() {
                println!("No groups yet");
            }
            for group in groups {
                let names: Vec<&str> = group.members.iter().map(|m| m.username()).collect();
                println!("#{:<4} {:<24} {}", group.id, group.name, names.join(" → "));
            }
        }
        GroupCommand::Show { group_id } => {
            let group = get_group(conn, group_id)?
                .with_context(|| format!("Group {} not found", group_id))?;
            println!("👥 {} (#{})", group.name, group.id);
            for member in &group.members {
                println!("  {}. {} <{}>", member.position + 1, member.username(), member.user.email);
            }
        }
    }
    Ok(())
}

fn run_member(conn: &Connection, cmd: MemberCommand) -> Result<()> {
    match cmd {
        MemberCommand::Add { group_id, user_id } => {
            let member = add_member(conn, group_id, user_id)?;
            println!(
                "✓ {} joined group #{} at position {}",
                member.username(),
                group_id,
                member.position + 1
            );
        }
    }
    Ok(())
}

fn run_round(conn: &Connection, cmd: RoundCommand) -> Result<()> {
    match cmd {
        RoundCommand::Record(args) => {
            let new_round = NewRound::new(args.group_id, args.paid_by, args.amount, args.notes);
            let round = insert_round(conn, &new_round)?;
            println!("🍺 Round #{} recorded ({} cents)", round.id, round.amount);

            let next = RotationResolver::resolve(conn, args.group_id)?;
            println!("   Next up: {}", next.username());
        }
        RoundCommand::List { group_id } => {
            let rounds = get_rounds_for_group(conn, group_id)?;
            for round in rounds {
                println!(
                    "#{:<5} {}  payer #{:<4} {:>8}  {}",
                    round.id,
                    round.date.format("%Y-%m-%d %H:%M"),
                    round.paid_by_id,
                    round.amount,
                    round.notes.unwrap_or_default()
                );
            }
        }
        RoundCommand::Export { group_id, path } => {
            let written = export_rounds_csv(conn, group_id, &path)?;
            println!("✓ Exported {} rounds to {:?}", written, path);
        }
    }
    Ok(())
}

fn run_next(conn: &Connection, group_id: i64, upcoming: Option<usize>) -> Result<()> {
    let next = RotationResolver::resolve(conn, group_id)?;
    println!("🍺 Next round: {} <{}>", next.username(), next.user.email);

    if let Some(count) = upcoming {
        let order = RotationResolver::upcoming(conn, group_id, count)?;
        for (i, member) in order.iter().enumerate() {
            println!("  {}. {}", i + 1, member.username());
        }
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(conn: Connection) -> Result<()> {
    let mut app = ui::App::new(conn)?;
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_conn: Connection) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin whose-round-server --features server");
    std::process::exit(1);
}
