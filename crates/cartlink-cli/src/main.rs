use std::path::PathBuf;
use std::process::ExitCode;

use cartlink_cli::config::{self, Config, SettingsStore};
use cartlink_cli::library::LibraryDir;
use cartlink_cli::patching::{self, OutputFormat};
use cartlink_cli::{CliError, open_catalog, read_input, write_output};
use cartlink_core::catalog::{CatalogKey, CatalogSource};
use cartlink_reader::{
    CartReader, CartridgeSession, Identification, LoadOptions, ReaderClient, SaveSync,
    WorkflowError, identify, load_cartridge,
};
use clap::{Parser, Subcommand};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "cartlink", version, about = "Dump, patch and reflash cartridges through a network reader")]
struct Args {
    /// Config file to read instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the cartridge reader
    #[arg(long, global = true)]
    reader: Option<String>,

    /// Catalog server URL or local catalog directory
    #[arg(long, global = true)]
    catalog: Option<String>,

    /// ROM library directory
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Identify the inserted cartridge
    Info,

    /// Dump the cartridge into the library, patching it when the catalog says so
    Load {
        /// Also dump the save and place it next to the ROM
        #[arg(long)]
        save: bool,

        /// Keep the ROM exactly as dumped
        #[arg(long)]
        no_patch: bool,
    },

    /// Dump the cartridge save
    DumpSave {
        /// Output file (default: the library save name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a save to the cartridge and verify it
    WriteSave { file: PathBuf },

    /// Store an updated save in the library, uploading it when configured
    SyncSave { file: PathBuf },

    /// Flash a ROM to the cartridge and verify it
    Reflash { rom: PathBuf },

    /// Offline patch tools
    #[command(subcommand)]
    Patch(PatchCommand),

    /// Show or edit the config file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print the CRC32 of a ROM and the ids in its library name
    Crc { rom: PathBuf },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the settings in effect
    Show,
    /// Print the config file location
    Path,
    /// Change one setting and save the file
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum PatchCommand {
    /// Apply a BPS or change-group patch
    Apply {
        patch: PathBuf,
        rom: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Build a patch turning BASE into MODIFIED
    Create {
        base: PathBuf,
        modified: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Bps)]
        format: OutputFormat,
        #[arg(short, long)]
        output: PathBuf,
        /// Also write a catalog variant document into this directory
        #[arg(long)]
        catalog_json: Option<PathBuf>,
    },

    /// Re-encode a change-group patch
    Convert {
        patch: PathBuf,
        #[arg(long, value_enum)]
        format: OutputFormat,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn settings(args: &Args, store: &SettingsStore) -> Config {
    let mut cfg = store.get().clone();
    if let Some(url) = &args.reader {
        cfg.reader_url = url.clone();
    }
    if let Some(url) = &args.catalog {
        cfg.catalog_url = url.clone();
    }
    if let Some(dir) = &args.library {
        cfg.library_dir = dir.clone();
    }
    cfg
}

struct Context {
    cfg: Config,
    store: SettingsStore,
}

impl Context {
    fn reader(&self) -> Result<ReaderClient, CliError> {
        Ok(ReaderClient::new(&self.cfg.reader_url, self.cfg.timeout())?)
    }

    fn catalog(&self) -> Result<Box<dyn CatalogSource>, CliError> {
        open_catalog(&self.cfg.catalog_url, self.cfg.timeout())
    }

    fn library(&self) -> Result<LibraryDir, CliError> {
        LibraryDir::open(&self.cfg.library_dir).map_err(|source| CliError::Io {
            path: self.cfg.library_dir.clone(),
            source,
        })
    }

    fn identify(&self, reader: &ReaderClient) -> Result<Identification, CliError> {
        let identification = identify(reader, self.catalog()?.as_ref())?;
        if !identification.reader_reachable {
            return Err(WorkflowError::ReaderUnreachable.into());
        }
        Ok(identification)
    }
}

fn print_identification(identification: &Identification) -> Result<(), CliError> {
    let descriptor = &identification.descriptor;
    let resolution = &identification.resolution;
    println!("Cartridge: {} ({})", descriptor.rom_name.trim(), descriptor.cart_id);
    println!("Version:   {}", descriptor.rom_version);
    println!(
        "Checksum:  {} ({})",
        resolution.checksum_variant,
        if resolution.checksum_matched {
            "matches catalog"
        } else {
            "unverified"
        }
    );
    println!("Catalog:   {:?} entry, {:?}", resolution.source, resolution.state);
    println!("Library:   {}", identification.rom_file_name());
    println!("{}", resolution.entry.to_json_pretty()?);
    Ok(())
}

fn run_patch(ctx: &Context, command: PatchCommand) -> Result<(), CliError> {
    match command {
        PatchCommand::Apply { patch, rom, output } => {
            let len = patching::apply_patch_file(&patch, &rom, &output)?;
            info!("Wrote {len} byte patched image to {}", output.display());
        }
        PatchCommand::Create {
            base,
            modified,
            format,
            output,
            catalog_json,
        } => {
            patching::create_patch_file(&base, &modified, format, &output)?;
            info!("Wrote {format:?} patch to {}", output.display());

            if let Some(dir) = catalog_json {
                let release = patching::release_for(&base, &read_input(&base)?, &modified, &output)?;
                let key = CatalogKey::Cartridge(release.cart_id.clone());
                let base_entry = match ctx
                    .catalog()
                    .and_then(|c| c.lookup(&key).map_err(CliError::from))
                {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("No base catalog entry for {}: {e}", release.cart_id);
                        None
                    }
                };
                let path = patching::write_catalog_document(&dir, &release, base_entry.as_ref())?;
                info!("Wrote catalog document {}", path.display());
            }
        }
        PatchCommand::Convert {
            patch,
            format,
            output,
        } => patching::convert_patch_file(&patch, format, &output)?,
    }
    Ok(())
}

fn run_config(ctx: &mut Context, command: ConfigCommand) -> Result<(), CliError> {
    match command {
        ConfigCommand::Show => {
            let text = toml::to_string_pretty(&ctx.cfg)
                .map_err(|e| CliError::Usage(format!("cannot render config: {e}")))?;
            print!("{text}");
        }
        ConfigCommand::Path => println!("{}", ctx.store.path().display()),
        ConfigCommand::Set { key, value } => {
            let mut edited = ctx.store.get().clone();
            edited.set(&key, &value).map_err(CliError::Usage)?;
            let path = ctx.store.path().to_path_buf();
            ctx.store
                .update(|cfg| *cfg = edited)
                .map_err(|source| CliError::Io { path, source })?;
        }
    }
    Ok(())
}

fn run(ctx: &mut Context, command: Command) -> Result<(), CliError> {
    match command {
        Command::Info => {
            let reader = ctx.reader()?;
            print_identification(&ctx.identify(&reader)?)?;
        }
        Command::Load { save, no_patch } => {
            let reader = ctx.reader()?;
            let catalog = ctx.catalog()?;
            let mut library = ctx.library()?;
            let options = LoadOptions {
                with_save: save,
                apply_patch: !no_patch,
            };
            let session = load_cartridge(&reader, catalog.as_ref(), &mut library, options)?;
            println!("{}", library.root().join(&session.rom_name).display());
            if let Some(save) = &library.loaded_save {
                println!("{}", library.root().join(save).display());
            }
        }
        Command::DumpSave { output } => {
            let reader = ctx.reader()?;
            let identification = ctx.identify(&reader)?;
            let data = reader.dump_save(identification.save_code()?)?;
            let output = output
                .unwrap_or_else(|| ctx.cfg.library_dir.join(identification.save_file_name()));
            write_output(&output, &data)?;
            println!("{}", output.display());
        }
        Command::WriteSave { file } => {
            let reader = ctx.reader()?;
            let identification = ctx.identify(&reader)?;
            reader.write_save(&read_input(&file)?, identification.save_code()?)?;
            info!("Save written and verified");
        }
        Command::SyncSave { file } => {
            let reader = ctx.reader()?;
            let identification = ctx.identify(&reader)?;
            let session = CartridgeSession::new(&identification);
            let mut library = ctx.library()?;
            let sync = SaveSync::new(&reader, ctx.cfg.upload_saves_to_cartridge);
            let uploaded = sync.on_save_updated(&session, &mut library, &read_input(&file)?)?;
            println!("{}", library.root().join(&session.save_name).display());
            if !uploaded {
                info!("Cartridge save left unchanged");
            }
        }
        Command::Reflash { rom } => {
            ctx.reader()?.reflash(&read_input(&rom)?)?;
            info!("ROM flashed and verified");
        }
        Command::Patch(command) => run_patch(ctx, command)?,
        Command::Config(command) => run_config(ctx, command)?,
        Command::Crc { rom } => println!("{}", patching::crc_report(&rom)?),
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut store = SettingsStore::load(path);
    store.subscribe(|cfg| info!("Config: saved (reader {}, catalog {})", cfg.reader_url, cfg.catalog_url));
    let mut ctx = Context {
        cfg: settings(&args, &store),
        store,
    };
    match run(&mut ctx, args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cartlink: {e}");
            ExitCode::FAILURE
        }
    }
}
