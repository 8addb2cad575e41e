use crate::infra::{in_memory_engine, session_start, MemoryEngine};
use chrono::{Local, NaiveDate};
use clap::Args;
use kennel_engine::error::AppError;
use kennel_engine::workflows::training::{
    demo_catalog, Audience, BookingId, BookingStatus, CustomerId, EngineError, NewAppointment,
    ProgressReport, RequirementCatalog, SourceId, Subject, TenantSettings, TrainerId,
};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct CatalogCheckArgs {
    /// Levels export (level_id, rank, level_name, license, requirement_id, kind, ...)
    #[arg(long)]
    pub(crate) levels: PathBuf,
    /// Training type export (source_id, name, default_price_cents)
    #[arg(long)]
    pub(crate) training_types: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Seats in the demo group class
    #[arg(long, default_value_t = 2)]
    pub(crate) capacity: u32,
    /// Session date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date: Option<NaiveDate>,
    /// Record achievements without charging balances
    #[arg(long)]
    pub(crate) no_auto_billing: bool,
    /// Charge balances without recording achievements
    #[arg(long)]
    pub(crate) no_auto_progress: bool,
}

const PARTICIPANTS: [(&str, &str, i64); 4] = [
    ("cust-ada", "Biscuit", 20_000),
    ("cust-ben", "Pepper", 20_000),
    ("cust-cai", "Juno", 1_000),
    ("cust-dee", "Moss", 20_000),
];

pub(crate) fn run_catalog_check(args: CatalogCheckArgs) -> Result<(), AppError> {
    let catalog = RequirementCatalog::from_paths(&args.levels, &args.training_types)?;
    println!(
        "Catalog OK: {} levels, {} training types",
        catalog.levels().len(),
        catalog.training_types().count()
    );
    render_catalog(&catalog);
    Ok(())
}

fn render_catalog(catalog: &RequirementCatalog) {
    for level in catalog.levels() {
        let marker = if level.license { " [license]" } else { "" };
        println!("\n{}. {} ({}){}", level.rank, level.name, level.id, marker);
        if level.requirements.is_empty() {
            println!("   no requirements");
        }
        for requirement in &level.requirements {
            println!(
                "   - {} x{} {} ({})",
                requirement.kind.label(),
                requirement.required_count,
                requirement.source_id,
                requirement.id
            );
        }
    }

    if !catalog.license_prerequisites().is_empty() {
        println!("\nLicense prerequisites");
        for requirement in catalog.license_prerequisites() {
            println!("   - x{} {}", requirement.required_count, requirement.source_id);
        }
    }

    println!("\nTraining types");
    for training in catalog.training_types() {
        let price = training
            .default_price_cents
            .map(cents)
            .unwrap_or_else(|| "no default price".to_string());
        println!("   - {} ({}): {}", training.name, training.source_id, price);
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let settings = TenantSettings {
        auto_billing_enabled: !args.no_auto_billing,
        auto_progress_enabled: !args.no_auto_progress,
    };
    let engine = in_memory_engine(demo_catalog());

    println!("Kennel engine demo for {date}");
    println!(
        "Tenant switches: auto billing {}, auto progress {}",
        on_off(settings.auto_billing_enabled),
        on_off(settings.auto_progress_enabled)
    );

    for (customer, _, cents_funded) in PARTICIPANTS {
        engine.credit(&CustomerId::new(customer), cents_funded, "opening balance")?;
    }

    let appointment = engine.create_appointment(NewAppointment {
        capacity: args.capacity.max(1),
        trainer_id: TrainerId::new("trainer-mia"),
        audience: Audience::OpenForAll,
        source_id: Some(SourceId::new("group_class")),
        price_cents: None,
        start_time: session_start(date, 10),
    })?;
    println!(
        "\nGroup class {} with {} seats",
        appointment.id, appointment.capacity
    );

    let mut bookings: Vec<BookingId> = Vec::new();
    for (customer, dog, _) in PARTICIPANTS {
        let outcome = engine.book(&appointment.id, Subject::with_dog(customer, dog))?;
        match outcome.waitlist_position {
            Some(position) => println!("- {customer} & {dog}: waitlisted at position {position}"),
            None => println!(
                "- {customer} & {dog}: confirmed ({}/{})",
                outcome.confirmed_count, outcome.capacity
            ),
        }
        bookings.push(outcome.booking.id);
    }

    if let Some(first) = bookings.first() {
        let outcome = engine.cancel(first)?;
        match outcome.promoted {
            Some(promoted) => println!(
                "\n{} cancelled; {} promoted from the waitlist",
                outcome.cancelled.customer_id, promoted.customer_id
            ),
            None => println!("\n{} cancelled; nobody waiting", outcome.cancelled.customer_id),
        }
    }

    println!("\nBilling the class");
    for entry in engine.bill_all(&appointment.id, &settings)? {
        match &entry.outcome {
            Ok(receipt) => println!(
                "- {}: charged {}{}",
                entry.customer_id,
                cents(receipt.charged_cents),
                receipt
                    .balance_after_cents
                    .map(|balance| format!(", balance {}", cents(balance)))
                    .unwrap_or_default()
            ),
            Err(err) => println!("- {}: not billed ({})", entry.customer_id, err),
        }
    }

    let roster = engine.roster(&appointment.id)?;
    let waiting = roster
        .bookings
        .iter()
        .filter(|booking| booking.status == BookingStatus::Waitlist)
        .count();
    println!(
        "Roster: {} confirmed, {} waitlisted",
        roster.confirmed_count(),
        waiting
    );

    level_up_walkthrough(&engine, date, &settings)
}

/// Top up one team's ledger with enough classes and an exam to level up.
fn level_up_walkthrough(
    engine: &MemoryEngine,
    date: NaiveDate,
    settings: &TenantSettings,
) -> Result<(), AppError> {
    let (customer, dog, _) = PARTICIPANTS[1];
    let team = Subject::with_dog(customer, dog);
    println!("\nProgression for {team}");

    for hour in 11..17 {
        attend(engine, &team, "group_class", session_start(date, hour), settings)?;
    }
    render_report(&engine.progress_report(&team)?);

    let Some(next) = engine
        .catalog()
        .entry_level()
        .and_then(|level| engine.catalog().next_level(&level.id))
        .map(|level| level.id.clone())
    else {
        return Ok(());
    };

    match engine.level_up(&team, &next) {
        Err(EngineError::RequirementsNotMet { shortfalls, .. }) => {
            for shortfall in shortfalls {
                println!(
                    "  blocked: {} {}/{}",
                    shortfall.source_id, shortfall.achieved, shortfall.required
                );
            }
        }
        Err(err) => return Err(err.into()),
        Ok(_) => {}
    }

    engine.record_achievement(&team, SourceId::new("exam"))?;
    match engine.level_up(&team, &next) {
        Ok(outcome) => println!(
            "  level up {} -> {} ({} achievements consumed)",
            outcome.from,
            outcome.to,
            outcome.consumed.len()
        ),
        Err(err) => println!("  level up refused: {err}"),
    }
    render_report(&engine.progress_report(&team)?);
    Ok(())
}

fn attend(
    engine: &MemoryEngine,
    team: &Subject,
    source: &str,
    start_time: chrono::DateTime<chrono::Utc>,
    settings: &TenantSettings,
) -> Result<(), AppError> {
    let appointment = engine.create_appointment(NewAppointment {
        capacity: 6,
        trainer_id: TrainerId::new("trainer-mia"),
        audience: Audience::OpenForAll,
        source_id: Some(SourceId::new(source)),
        price_cents: None,
        start_time,
    })?;
    let booking = engine.book(&appointment.id, team.clone())?.booking;
    engine.toggle_attendance(&booking.id)?;
    engine.bill_one(&booking.id, settings)?;
    Ok(())
}

fn render_report(report: &ProgressReport) {
    println!(
        "  {} (rank {}){}",
        report.level_name,
        report.rank,
        if report.eligible { " - ready to level up" } else { "" }
    );
    for row in report
        .requirements
        .iter()
        .chain(report.license_prerequisites.iter())
    {
        println!(
            "    {:<10} {:<16} {}/{}",
            row.kind.label(),
            row.training_type.as_deref().unwrap_or(row.source_id.as_str()),
            row.achieved,
            row.required
        );
    }
}

fn cents(amount: i64) -> String {
    format!("{}.{:02}", amount / 100, (amount % 100).abs())
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
