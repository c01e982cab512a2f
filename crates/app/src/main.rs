use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};
use lightweave_core::adaption::{AdaptionHint, KeyboardSection};
use lightweave_core::device::{demo_keyboard, demo_led_strip, demo_mouse, DeviceType};
use lightweave_core::effects::{BrushEntity, EffectSlot, BUILTIN_PROVIDER};
use lightweave_core::{
    AppConfig, DeviceId, Engine, LoopState, Profile, ProfileEntity, ProviderKey, ProviderRegistry, RenderLoop,
    SimulatedDevice, TickOutcome,
};
use tracing_subscriber::EnvFilter;

const KEYBOARD: &str = "demo-keyboard";

fn main() -> lightweave_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            profile,
            config,
            ticks,
            realtime,
        } => run(&profile, config.as_deref(), ticks, realtime),
        Commands::Validate { profile } => validate(&profile),
        Commands::Demo { output } => write_demo(&output),
    }
}

fn run(profile: &Path, config: Option<&Path>, ticks: u32, realtime: bool) -> lightweave_core::Result<()> {
    let config = match config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let budget = config.render.frame_budget();
    tracing::info!(?profile, ticks, realtime, "starting render");

    let registry = Arc::new(ProviderRegistry::with_builtins());
    let engine = Arc::new(Engine::new(config, registry));
    engine.add_device(Box::new(SimulatedDevice::new(demo_keyboard(KEYBOARD, false))));
    engine.add_device(Box::new(SimulatedDevice::new(demo_mouse("demo-mouse"))));
    engine.add_device(Box::new(SimulatedDevice::new(demo_led_strip("demo-strip", 16))));
    // The keyboard goes last so it ends up as the active device.
    for id in ["demo-mouse", "demo-strip", KEYBOARD] {
        engine.enable_device(&DeviceId::new(id))?;
    }

    let text = std::fs::read_to_string(profile)?;
    engine.load_profile(&ProfileEntity::from_json(&text)?)?;

    if realtime {
        let mut render_loop = RenderLoop::new(Arc::clone(&engine));
        if render_loop.start()? == LoopState::Stopped {
            tracing::warn!("nothing to render");
            return Ok(());
        }
        thread::sleep(budget * ticks);
        render_loop.stop()?;
        let stats = engine.stats();
        tracing::info!(
            frames = stats.frames,
            overruns = stats.overruns,
            average = ?stats.average_frame(),
            "render loop finished"
        );
    } else {
        for _ in 0..ticks {
            if let TickOutcome::Idle(reason) = engine.tick(budget)? {
                tracing::warn!(?reason, "engine idle");
                break;
            }
        }
    }

    for buffer in engine.surface_snapshot() {
        let colors: Vec<String> = buffer
            .colors
            .iter()
            .map(|c| format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b))
            .collect();
        println!("{}: {}", buffer.device, colors.join(" "));
    }
    Ok(())
}

fn validate(path: &Path) -> lightweave_core::Result<()> {
    let text = std::fs::read_to_string(path)?;
    let entity = ProfileEntity::from_json(&text)?;
    let registry = ProviderRegistry::with_builtins();
    let profile = Profile::from_entity(&entity, &registry)?;

    let tree = profile.tree();
    let placeholders = profile
        .get_all_render_elements()
        .into_iter()
        .filter_map(|key| tree.get(key).ok())
        .map(|node| {
            let effects = node
                .render_state()
                .effects()
                .iter()
                .filter(|effect| effect.is_placeholder())
                .count();
            let brush = node
                .as_layer()
                .and_then(|layer| layer.brush())
                .is_some_and(|brush| brush.is_placeholder());
            effects + usize::from(brush)
        })
        .sum::<usize>();

    let lossless = profile.to_entity() == entity;
    println!(
        "{}: {} folders, {} layers, {} placeholders, round-trip {}",
        profile.name(),
        profile.get_all_folders().len(),
        profile.get_all_layers().len(),
        placeholders,
        if lossless { "lossless" } else { "normalised" }
    );
    Ok(())
}

fn write_demo(output: &Path) -> lightweave_core::Result<()> {
    let registry = ProviderRegistry::with_builtins();
    let mut profile = Profile::new("Demo")?;
    let root = profile.root_folder();

    let strip = profile.add_layer(root)?;
    let keys = profile.add_folder(root)?;
    let arrows = profile.add_layer(keys)?;

    let builtin = |name: &str| ProviderKey::new(BUILTIN_PROVIDER, name);
    {
        let tree = profile.tree_mut();
        let node = tree.get_mut(strip)?;
        node.name = "Rainbow strip".into();
        let layer = node
            .as_layer_mut()
            .ok_or_else(|| lightweave_core::LightweaveError::msg("expected a layer"))?;
        layer.set_brush(Some(registry.resolve_brush(BrushEntity::new(builtin("Rainbow")))?));
        layer.adapter_mut().hints.push(AdaptionHint::device_type(DeviceType::LedStrip));

        let node = tree.get_mut(arrows)?;
        node.name = "Arrow keys".into();
        let layer = node
            .as_layer_mut()
            .ok_or_else(|| lightweave_core::LightweaveError::msg("expected a layer"))?;
        layer.set_brush(Some(registry.resolve_brush(BrushEntity::new(builtin("Solid")))?));
        layer.adapter_mut().hints.push(AdaptionHint::KeyboardSection {
            section: KeyboardSection::ArrowKeys,
        });
        tree.add_layer_effect(arrows, EffectSlot::Live(registry.instantiate_effect(&builtin("Dim"))?))?;
    }

    std::fs::write(output, profile.to_entity().to_json()?)?;
    tracing::info!(?output, "demo profile written");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Addressable LED profile engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a profile against simulated devices and print the final colours.
    Run {
        /// Profile JSON to load.
        #[arg(short, long)]
        profile: PathBuf,
        /// Optional configuration JSON; absent fields keep their defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of frames to render.
        #[arg(short, long, default_value_t = 25)]
        ticks: u32,
        /// Run on the render thread at the configured frame rate instead of
        /// stepping frames directly.
        #[arg(long)]
        realtime: bool,
    },
    /// Load a profile, report its contents and check it survives a round-trip.
    Validate {
        #[arg(short, long)]
        profile: PathBuf,
    },
    /// Write a sample profile.
    Demo {
        /// Output path for the profile JSON.
        #[arg(short, long)]
        output: PathBuf,
    },
}
