use log::{debug, info};
use sprite_patcher::assembler::CommandAssembler;
use sprite_patcher::config::PatcherConfig;
use sprite_patcher::lm_files::LmFiles;
use sprite_patcher::manifest::Manifest;
use sprite_patcher::pipeline;
use sprite_patcher::remap::RemapOutcome;
use sprite_patcher::serialize::write_artifacts;
use sprite_patcher::Rom;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn usage(program: &str) {
    println!("sprite-patcher - custom sprite inserter for SNES ROM images");
    println!();
    println!(
        "Usage: {} <rom_file> [--config pixi_conf.toml] [--records sprites.toml]",
        program
    );
    println!();
    println!("Assembles every sprite of the record manifest into the ROM with the");
    println!("configured assembler, applies the main patches, remaps level sprite");
    println!("data and writes the Lunar Magic side files next to the ROM.");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
        return Ok(());
    }

    let rom_path = PathBuf::from(&args[1]);
    let mut config_path = None;
    let mut records_path = None;
    let mut i = 2;
    while i < args.len() {
        match (args[i].as_str(), args.get(i + 1)) {
            ("--config", Some(value)) => config_path = Some(PathBuf::from(value)),
            ("--records", Some(value)) => records_path = Some(PathBuf::from(value)),
            (flag, _) => {
                eprintln!("Error: unknown or incomplete option {}", flag);
                usage(&args[0]);
                std::process::exit(1);
            }
        }
        i += 2;
    }

    let config = PatcherConfig::load_or_default(config_path.as_deref())?;
    debug!("{:?}", config);

    let mut rom = match Rom::load(&rom_path) {
        Ok(rom) => rom,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    println!("{}", rom);

    let manifest = match &records_path {
        Some(path) => Manifest::load(path)?,
        None => Manifest::default(),
    };
    let mut tables = manifest.into_tables(config.per_level)?;

    let mut assembler = CommandAssembler::new(&config.paths.assembler, &config.paths.temp)
        .with_include_dir(&config.paths.asm);
    let report = match pipeline::run(&mut rom, &mut assembler, &config, &mut tables) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    rom.save(&rom_path)?;

    if config.keep_temp {
        fs::create_dir_all(&config.paths.asm)?;
        write_artifacts(&report.artifacts, &config.paths.asm)?;
    }
    let mut lm = LmFiles::load_bases(&config.extensions)?;
    lm.add_tables(&tables)?;
    lm.write(Path::new(&rom_path))?;

    let populated = [tables.normal(), tables.cluster(), tables.extended()]
        .iter()
        .map(|list| list.iter().filter(|s| s.is_populated()).count())
        .collect::<Vec<_>>();
    println!(
        "Sprites: {} normal, {} cluster, {} extended ({} assembled, {} shared)",
        populated[0],
        populated[1],
        populated[2],
        report.patched.assembled,
        report.patched.shared
    );
    match &report.remap {
        Some(RemapOutcome::Remapped(levels)) => {
            info!("Remapped levels: {:X?}", levels);
            println!("Sprite data remapped for {} levels", levels.len());
        }
        Some(RemapOutcome::Unchanged) => println!("Sprite data unchanged"),
        None => println!("Sprite data remapping disabled"),
    }
    println!("All sprites applied successfully");
    Ok(())
}
