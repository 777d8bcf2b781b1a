use crate::config::Config;
use crate::errors::AppResult;
use crate::ui::messages;

use crate::cli::parser::Commands;
use std::process::Command;

/// Handle the `config` subcommand
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Config {
        print_config,
        check,
        edit_config,
        editor,
    } = cmd
    {
        // Path del file di configurazione
        let path = Config::config_file();

        // ---- PRINT CONFIG ----
        if *print_config {
            println!("📄 Current configuration:\n");
            println!("{}", serde_yaml::to_string(cfg).unwrap_or_default());
        }

        // ---- CHECK CONFIG ----
        if *check {
            check_config_file(&path)?;
        }

        // ---- EDIT CONFIG ----
        if *edit_config {
            // User-requested editor (e.g. --editor vim)
            let requested_editor = editor.clone();

            // Default editor basato sulla piattaforma
            let default_editor = std::env::var("EDITOR")
                .or_else(|_| std::env::var("VISUAL"))
                .unwrap_or_else(|_| {
                    if cfg!(target_os = "windows") {
                        "notepad".to_string()
                    } else {
                        "nano".to_string()
                    }
                });

            // Se l'utente ha passato --editor, usiamo quello
            let editor_to_use = requested_editor.unwrap_or_else(|| default_editor.clone());

            // Primo tentativo: editor richiesto
            let status = Command::new(&editor_to_use).arg(&path).status();

            match status {
                Ok(s) if s.success() => {
                    println!(
                        "✅ Configuration file edited successfully using '{}'",
                        editor_to_use
                    );
                }
                Ok(_) | Err(_) => {
                    eprintln!(
                        "⚠️  Editor '{}' not available, falling back to '{}'",
                        editor_to_use, default_editor
                    );

                    // Fallback
                    let fallback_status = Command::new(&default_editor).arg(&path).status();
                    match fallback_status {
                        Ok(s) if s.success() => {
                            println!(
                                "✅ Configuration file edited successfully using fallback '{}'",
                                default_editor
                            );
                        }
                        Ok(_) | Err(_) => {
                            eprintln!(
                                "❌ Failed to edit configuration file using fallback '{}'",
                                default_editor
                            );
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Report which of the sync/AI era keys are missing from the YAML file.
/// Missing keys are not an error: serde fills the defaults at load time,
/// and `db --migrate` writes them into the file.
fn check_config_file(path: &std::path::Path) -> AppResult<()> {
    if !path.exists() {
        messages::warning(format!(
            "No configuration file at {} (run `fieldlog init`)",
            path.display()
        ));
        return Ok(());
    }

    let raw = std::fs::read_to_string(path)?;
    let doc: serde_yaml::Value =
        serde_yaml::from_str(&raw).map_err(|_| crate::errors::AppError::ConfigLoad)?;

    let mut missing = Vec::new();
    for (key, _) in crate::config::migrate::missing_key_defaults() {
        if doc.get(key).is_none() {
            missing.push(key);
        }
    }

    if missing.is_empty() {
        messages::success("Configuration file is complete.");
    } else {
        messages::warning("Configuration file is missing keys (defaults apply):");
        for key in missing {
            messages::kv(key, "missing");
        }
        messages::info("Run `fieldlog db --migrate` to write the defaults into the file.");
    }

    Ok(())
}
