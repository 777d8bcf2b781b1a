use crate::cli::parser::{Commands, FenceCmd};
use crate::config::Config;
use crate::core::effects::EffectsLogic;
use crate::core::usecases::UseCaseLogic;
use crate::db::locations;
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::platform::AppEnv;
use crate::ui::messages;
use crate::utils::formatting::pad_right;
use crate::utils::time::resolve_at;

/// Handle `fence add|update|del|list`. Geometry changes enqueue a platform
/// mirror refresh and a settle probe, which the trailing drain executes.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Fence { action } = cmd else {
        return Ok(());
    };

    let mut pool = DbPool::new(&cfg.database)?;

    match action {
        FenceCmd::Add {
            name,
            lat,
            lng,
            radius_m,
            at,
        } => {
            let now = resolve_at(at.as_ref())?;
            let fence = UseCaseLogic::create_fence(&mut pool, cfg, name, *lat, *lng, *radius_m, now)?;
            messages::success(format!("Fence '{}' registered.", fence.name));
            messages::kv("id", &fence.id);
            messages::kv("radius", format!("{:.0} m", fence.radius_m));

            let env = AppEnv::cli(None);
            EffectsLogic::drain(&mut pool, cfg, &env, now)?;
        }

        FenceCmd::Update {
            key,
            name,
            lat,
            lng,
            radius_m,
            at,
        } => {
            let now = resolve_at(at.as_ref())?;
            let fence = UseCaseLogic::update_fence(
                &mut pool,
                cfg,
                key,
                name.as_deref(),
                *lat,
                *lng,
                *radius_m,
                now,
            )?;
            messages::success(format!("Fence '{}' updated.", fence.name));

            let env = AppEnv::cli(None);
            EffectsLogic::drain(&mut pool, cfg, &env, now)?;
        }

        FenceCmd::Del { key, at } => {
            let now = resolve_at(at.as_ref())?;
            let fence = UseCaseLogic::delete_fence(&mut pool, cfg, key, now)?;
            messages::success(format!(
                "Fence '{}' deleted. Its sessions are kept.",
                fence.name
            ));

            let env = AppEnv::cli(None);
            EffectsLogic::drain(&mut pool, cfg, &env, now)?;
        }

        FenceCmd::List => {
            let fences = locations::list_active(&pool.conn, &cfg.user_id)?;
            if fences.is_empty() {
                println!("No fences registered. Add one with `fence add`.");
                return Ok(());
            }

            let name_w = fences.iter().map(|f| f.name.len()).max().unwrap_or(4).max(4);

            println!("🗺️  Fences:\n");
            println!(
                "{}  {}  {:>9}  {:>9}  {:>7}",
                pad_right("ID", 8),
                pad_right("NAME", name_w),
                "LAT",
                "LNG",
                "RADIUS"
            );
            for f in fences {
                let short_id: String = f.id.chars().take(8).collect();
                println!(
                    "{}  {}  {:>9.4}  {:>9.4}  {:>5.0} m",
                    pad_right(&short_id, 8),
                    pad_right(&f.name, name_w),
                    f.lat,
                    f.lng,
                    f.radius_m
                );
            }
        }
    }

    Ok(())
}
