use anyhow::Result;
use chrono::Utc;

use crate::app::App;
use crate::config::{config_path, load_config, save_config};
use crate::prompt::{prompt, prompt_default};
use crate::state::{Profile, profile_path, read_profile, write_profile};

fn parse_optional_amount(s: &str) -> Option<f64> {
    s.trim().replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

pub fn run_setup() -> Result<()> {
    println!("treevü setup\n");
    let existing = read_profile()?;

    let current_name = existing.as_ref().map(|p| p.display_name.clone()).unwrap_or_default();
    let name = loop {
        let n = prompt_default("Tu nombre", &current_name)?;
        if !n.trim().is_empty() {
            break n.trim().to_string();
        }
    };

    // Keep the storage key stable across renames
    let profile = match existing {
        Some(p) => Profile { display_name: name, ..p },
        None => Profile {
            created_at_utc: Some(Utc::now().to_rfc3339()),
            user_id: Profile::user_id_for(&name),
            display_name: name,
        },
    };
    write_profile(&profile)?;

    let mut cfg = load_config()?;
    let income = prompt("Ingreso anual en soles, para el estimado de impuestos (opcional)")?;
    if let Some(v) = parse_optional_amount(&income) {
        cfg.tax.annual_income = Some(v);
    }
    save_config(&cfg)?;

    let budget = prompt("Presupuesto mensual en soles (opcional)")?;
    if let Some(v) = parse_optional_amount(&budget) {
        let mut app = App::with(cfg, profile.clone())?;
        app.session.set_budget(v)?;
    }

    println!("\nWrote:");
    println!("- {}", profile_path()?.display());
    println!("- {}", config_path()?.display());

    println!("\nNext recommended steps:");
    println!("- treevu auth paste-anthropic-token   (enables receipt scanning)");
    println!("- treevu expense add --merchant \"Tottus\" --total 45.90 --receipt boleta");
    println!("- treevu goal add \"Fondo de emergencia\" --target 1000");

    Ok(())
}
