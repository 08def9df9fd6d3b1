use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use founding_spots::infra::{PgCodeRegistry, PgProfileStore, PgRedemptionLedger, PgSpotAllocator};
use founding_spots::{
    BenefitBundle, CountryCode, NewPromoCode, PromoCodeKey, RedemptionService, UserId,
    UserProfile, UserType,
};

fn print_help() {
    eprintln!(
        "\
founding-spots-admin

USAGE:
  founding-spots-admin <command> [options]

COMMANDS:
  migrate                         Run database migrations
  create-code                     Register a new promo code
  list-codes                      List promo codes with their spot counters
  upsert-profile                  Create or replace a user profile
  export-redemptions              Export a code's redemptions to JSON/NDJSON
  verify-ledger                   Check a code's spots are dense and match its counter

COMMON OPTIONS:
  --database-url <postgres_url>    (defaults to env DATABASE_URL)

create-code OPTIONS:
  --code <code>                   (required) Case-insensitive code, stored upper-case
  --user-type <type>              (required) agent | landlord | owner | renter
  --country <iso2>                (required) Target country, e.g. GY
  --max-spots <n>                 (required) Number of founding spots
  --trial-days <n>                (optional)
  --property-limit <n>            (optional)
  --discount <pct>                (optional) 0-100
  --tier <name>                   (optional) Subscription tier to assign
  --description <text>            (optional)
  --expires-at <rfc3339>          (optional)
  --inactive                      (optional) Create the code switched off

upsert-profile OPTIONS:
  --user-id <uuid>                (required)
  --user-type <type>              (required)
  --country <iso2>                (required)

export-redemptions OPTIONS:
  --code <code>                   (required)
  --output <path>                 (optional) Output file path (default: stdout)
  --format <json|ndjson>          (default: ndjson)

verify-ledger OPTIONS:
  --code <code>                   (optional; otherwise all codes)
"
    );
}

fn require_database_url(database_url: Option<String>) -> anyhow::Result<String> {
    database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (or pass --database-url)"))
}

fn take_value(args: &mut VecDeque<String>, flag: &str) -> anyhow::Result<String> {
    args.pop_front()
        .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
}

async fn connect(database_url: Option<String>) -> anyhow::Result<sqlx::PgPool> {
    let database_url = require_database_url(database_url)?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    Ok(pool)
}

fn service(pool: sqlx::PgPool) -> RedemptionService {
    RedemptionService::new(
        Arc::new(PgCodeRegistry::new(pool.clone())),
        Arc::new(PgSpotAllocator::new(pool.clone())),
        Arc::new(PgRedemptionLedger::new(pool.clone())),
        Arc::new(PgProfileStore::new(pool)),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    match command.as_str() {
        "migrate" => {
            let mut database_url: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let pool = connect(database_url).await?;
            founding_spots::migrations::run_postgres(&pool).await?;
            println!("ok: migrations applied");
            Ok(())
        }
        "create-code" => {
            let mut database_url: Option<String> = None;
            let mut code: Option<PromoCodeKey> = None;
            let mut user_type: Option<UserType> = None;
            let mut country: Option<CountryCode> = None;
            let mut max_spots: Option<u32> = None;
            let mut benefits = BenefitBundle::default();
            let mut expires_at: Option<DateTime<Utc>> = None;
            let mut inactive = false;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "--code" => code = Some(PromoCodeKey::parse(&take_value(&mut args, &arg)?)?),
                    "--user-type" => user_type = Some(take_value(&mut args, &arg)?.parse()?),
                    "--country" => {
                        country = Some(CountryCode::parse(&take_value(&mut args, &arg)?)?)
                    }
                    "--max-spots" => max_spots = Some(take_value(&mut args, &arg)?.parse()?),
                    "--trial-days" => {
                        benefits.trial_days = Some(take_value(&mut args, &arg)?.parse()?)
                    }
                    "--property-limit" => {
                        benefits.property_limit = Some(take_value(&mut args, &arg)?.parse()?)
                    }
                    "--discount" => {
                        let pct: u8 = take_value(&mut args, &arg)?.parse()?;
                        if pct > 100 {
                            anyhow::bail!("--discount must be between 0 and 100");
                        }
                        benefits.discount_percentage = Some(pct);
                    }
                    "--tier" => benefits.tier = Some(take_value(&mut args, &arg)?),
                    "--description" => benefits.description = Some(take_value(&mut args, &arg)?),
                    "--expires-at" => {
                        let raw = take_value(&mut args, &arg)?;
                        expires_at = Some(DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc));
                    }
                    "--inactive" => inactive = true,
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let code = code.ok_or_else(|| anyhow::anyhow!("--code is required"))?;
            let user_type = user_type.ok_or_else(|| anyhow::anyhow!("--user-type is required"))?;
            let country = country.ok_or_else(|| anyhow::anyhow!("--country is required"))?;
            let max_spots = max_spots.ok_or_else(|| anyhow::anyhow!("--max-spots is required"))?;
            if max_spots == 0 {
                anyhow::bail!("--max-spots must be at least 1");
            }

            let mut new_code =
                NewPromoCode::new(code, user_type, country, max_spots).with_benefits(benefits);
            if let Some(expires_at) = expires_at {
                new_code = new_code.with_expiry(expires_at);
            }
            if inactive {
                new_code = new_code.inactive();
            }

            let pool = connect(database_url).await?;
            let created = service(pool).create_code(new_code).await?;
            println!(
                "ok: created {} ({}) with {} spots",
                created.code, created.id, created.max_redemptions
            );
            Ok(())
        }
        "list-codes" => {
            let mut database_url: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let pool = connect(database_url).await?;
            let codes = service(pool).list_codes().await?;

            println!(
                "{:<16} {:<9} {:<7} {:>7} {:>7}  {:<6} EXPIRES",
                "CODE", "AUDIENCE", "COUNTRY", "CLAIMED", "MAX", "ACTIVE"
            );
            for code in &codes {
                println!(
                    "{:<16} {:<9} {:<7} {:>7} {:>7}  {:<6} {}",
                    code.code.as_str(),
                    code.target_user_type.as_str(),
                    code.target_country.as_str(),
                    code.current_redemptions,
                    code.max_redemptions,
                    code.is_active,
                    code.expires_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
            eprintln!("ok: {} codes", codes.len());
            Ok(())
        }
        "upsert-profile" => {
            let mut database_url: Option<String> = None;
            let mut user_id: Option<UserId> = None;
            let mut user_type: Option<UserType> = None;
            let mut country: Option<CountryCode> = None;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "--user-id" => {
                        let raw = take_value(&mut args, &arg)?;
                        user_id = Some(UserId::from_uuid(Uuid::parse_str(&raw)?));
                    }
                    "--user-type" => user_type = Some(take_value(&mut args, &arg)?.parse()?),
                    "--country" => {
                        country = Some(CountryCode::parse(&take_value(&mut args, &arg)?)?)
                    }
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let user_id = user_id.ok_or_else(|| anyhow::anyhow!("--user-id is required"))?;
            let user_type = user_type.ok_or_else(|| anyhow::anyhow!("--user-type is required"))?;
            let country = country.ok_or_else(|| anyhow::anyhow!("--country is required"))?;

            let pool = connect(database_url).await?;
            service(pool)
                .upsert_profile(&UserProfile::new(user_id, user_type, country))
                .await?;
            println!("ok: profile {user_id} saved");
            Ok(())
        }
        "export-redemptions" => {
            let mut database_url: Option<String> = None;
            let mut code: Option<String> = None;
            let mut output_path: Option<String> = None;
            let mut format = "ndjson".to_string();

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "--code" => code = Some(take_value(&mut args, &arg)?),
                    "--output" => output_path = Some(take_value(&mut args, &arg)?),
                    "--format" => format = take_value(&mut args, &arg)?,
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let code = code.ok_or_else(|| anyhow::anyhow!("--code is required"))?;
            if !matches!(format.as_str(), "json" | "ndjson") {
                anyhow::bail!("--format must be 'json' or 'ndjson'");
            }

            let pool = connect(database_url).await?;
            let (promo, rows) = service(pool).redemptions(&code).await?;

            let mut output: Box<dyn Write> = match output_path {
                Some(path) => Box::new(std::fs::File::create(&path)?),
                None => Box::new(std::io::stdout()),
            };

            if format == "json" {
                serde_json::to_writer_pretty(&mut output, &rows)?;
                writeln!(output)?;
            } else {
                for row in &rows {
                    serde_json::to_writer(&mut output, row)?;
                    writeln!(output)?;
                }
            }

            eprintln!(
                "ok: exported {} redemptions for {} ({}/{} spots claimed)",
                rows.len(),
                promo.code,
                promo.current_redemptions,
                promo.max_redemptions
            );
            Ok(())
        }
        "verify-ledger" => {
            let mut database_url: Option<String> = None;
            let mut code: Option<String> = None;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "--code" => code = Some(take_value(&mut args, &arg)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let pool = connect(database_url).await?;
            let service = service(pool);

            let codes: Vec<String> = match code {
                Some(code) => vec![code],
                None => service
                    .list_codes()
                    .await?
                    .into_iter()
                    .map(|c| c.code.to_string())
                    .collect(),
            };

            let mut inconsistent = 0usize;
            for code in &codes {
                let audit = service.audit(code).await?;
                if audit.is_consistent() {
                    println!("ok: {code} spots 1..={} dense", audit.redemptions);
                } else {
                    inconsistent += 1;
                    println!(
                        "FAIL: {code} redemptions={} counter={} missing={:?} duplicate_spots={:?} duplicate_users={:?}",
                        audit.redemptions,
                        audit.counter,
                        audit.missing_spots,
                        audit.duplicate_spots,
                        audit.duplicate_users,
                    );
                }
            }

            if inconsistent > 0 {
                anyhow::bail!("{inconsistent} of {} codes failed verification", codes.len());
            }
            Ok(())
        }
        other => {
            print_help();
            anyhow::bail!("unknown command: {other}");
        }
    }
}
