#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use patchkit::config::{AppConfig, DEFAULT_CONFIG_FILE};
use patchkit::crx::{self, CrxPackage, ExtensionKey};
use patchkit::pak::{self, PatchRule, PatchSet, WriteOutcome};
use patchkit::prefs::{FileMacStore, ProtectedPrefs, RegistryMacStore, VerifyReport};

#[derive(Debug, Parser)]
#[command(name = "patchkit", version, about = "Pak, CRX and protected-preference tools")]
struct Cli {
    /// Configuration file (TOML). Missing files are ignored.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Chromium resource paks.
    #[command(subcommand)]
    Pak(PakCommand),

    /// CRX extension packages.
    #[command(subcommand)]
    Crx(CrxCommand),

    /// Protected preference codes.
    #[command(subcommand)]
    Prefs(PrefsCommand),
}

#[derive(Debug, Subcommand)]
enum PakCommand {
    /// List resources in a pak.
    List {
        #[arg(long)]
        pak: PathBuf,
        /// Print content kind too (inflates gzip resources).
        #[arg(long, default_value_t = false)]
        verbose: bool,
    },

    /// Verify table bounds and gzip framing.
    Verify {
        #[arg(long)]
        pak: PathBuf,
    },

    /// Export resources plus manifest.json to a directory.
    Export {
        #[arg(long)]
        pak: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },

    /// Rebuild a pak from an exported directory.
    Import {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },

    /// Apply content rules to a pak, or to every pak under a directory.
    Patch {
        #[arg(long)]
        target: PathBuf,
        /// Extra rule as PATTERN=REPLACEMENT (repeatable), added to configured rules.
        #[arg(long = "rule")]
        rules: Vec<String>,
        /// Extra rules match case-insensitively.
        #[arg(long, default_value_t = false)]
        ignore_case: bool,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[derive(Debug, Subcommand)]
enum CrxCommand {
    /// Print header details.
    Info {
        #[arg(long)]
        crx: PathBuf,
    },

    /// Unpack the embedded ZIP.
    Extract {
        #[arg(long)]
        crx: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },

    /// Print the selected public key as base64.
    Key {
        #[arg(long)]
        crx: PathBuf,
    },

    /// Write the package key into an unpacked manifest.json.
    InjectKey {
        #[command(flatten)]
        key: KeyInput,
        #[arg(long)]
        manifest: PathBuf,
        /// Defaults to rewriting the manifest in place.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the extension id.
    Id {
        #[command(flatten)]
        key: KeyInput,
    },
}

/// Where a public key comes from.
#[derive(Debug, Args)]
struct KeyInput {
    #[arg(long, conflicts_with_all = ["key_base64", "modulus_hex"])]
    crx: Option<PathBuf>,
    /// DER SubjectPublicKeyInfo, base64.
    #[arg(long, conflicts_with = "modulus_hex")]
    key_base64: Option<String>,
    /// Raw RSA modulus, big-endian hex.
    #[arg(long, requires = "exponent_hex")]
    modulus_hex: Option<String>,
    /// Raw RSA exponent, big-endian hex.
    #[arg(long, requires = "modulus_hex")]
    exponent_hex: Option<String>,
}

#[derive(Debug, Subcommand)]
enum PrefsCommand {
    /// Compare stored codes with the live values.
    Verify {
        #[command(flatten)]
        stores: StoreArgs,
    },

    /// Apply changes and recompute every code in both stores.
    Recalc {
        #[command(flatten)]
        stores: StoreArgs,
        /// PATH=JSON value to set before recomputing (repeatable).
        #[arg(long = "set")]
        sets: Vec<String>,
    },
}

#[derive(Debug, Args)]
struct StoreArgs {
    /// Preferences file holding `protection.macs`.
    #[arg(long)]
    prefs: PathBuf,
    /// JSON file standing in for the registry copy of the codes.
    #[arg(long)]
    registry: PathBuf,
    /// Overrides the configured device id.
    #[arg(long)]
    device_id: Option<String>,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    match cli.cmd {
        Command::Pak(cmd) => run_pak(cmd, &config),
        Command::Crx(cmd) => run_crx(cmd),
        Command::Prefs(cmd) => run_prefs(cmd, &config),
    }
}

fn run_pak(cmd: PakCommand, config: &AppConfig) -> Result<()> {
    match cmd {
        PakCommand::List { pak, verbose } => {
            let archive = pak::open(&pak)?;
            println!(
                "{} v{} encoding={} resources={} aliases={}",
                pak.display(),
                archive.version().as_u32(),
                archive.encoding(),
                archive.len(),
                archive.aliases().len()
            );
            for info in archive.resources() {
                let gz = if info.gzipped { " gz" } else { "" };
                if verbose {
                    let kind = archive
                        .get(info.id)
                        .and_then(|b| pak::Decoded::from_resource(info.id, b).ok())
                        .map(|d| format!("{:?}", d.kind()).to_lowercase())
                        .unwrap_or_else(|| "?".into());
                    println!("{:>6} @{:<10} {:>9} {}{}", info.id, info.offset, info.len, kind, gz);
                } else {
                    println!("{:>6} {:>9}{}", info.id, info.len, gz);
                }
            }
            for alias in archive.aliases() {
                println!("{:>6} -> index {}", alias.id, alias.target_index);
            }
        }
        PakCommand::Verify { pak } => {
            let report = pak::verify(&pak)?;
            for (id, reason) in &report.broken {
                println!("BROKEN {id}: {reason}");
            }
            println!(
                "OK: {} resources, {} gzip, {} broken",
                report.resources,
                report.gzipped,
                report.broken.len()
            );
            if !report.broken.is_empty() {
                bail!("{} gzip resources failed to inflate", report.broken.len());
            }
        }
        PakCommand::Export { pak, output } => {
            let manifest = pak::export_file(&pak, &output)?;
            println!(
                "exported {} resources to {}",
                manifest.resources.len(),
                output.display()
            );
        }
        PakCommand::Import { input, output } => {
            let outcome = pak::import_file(&input, &output)?;
            print_write(&output, &outcome);
        }
        PakCommand::Patch {
            target,
            rules,
            ignore_case,
            dry_run,
        } => {
            let set = patch_set(config, &rules, ignore_case)?;
            let files = if target.is_dir() {
                pak::find_paks(&target)?
            } else {
                vec![target]
            };
            if files.is_empty() {
                bail!("no .pak files found");
            }
            patch_files(&files, &set, dry_run)?;
        }
    }
    Ok(())
}

fn patch_set(config: &AppConfig, extra: &[String], ignore_case: bool) -> Result<PatchSet> {
    let mut rules = config.patch.rules.clone();
    for arg in extra {
        let (pattern, replacement) = arg
            .split_once('=')
            .with_context(|| format!("rule {arg:?} is not PATTERN=REPLACEMENT"))?;
        let mut rule = PatchRule::new(pattern, replacement);
        rule.case_insensitive = ignore_case;
        rules.push(rule);
    }
    if rules.is_empty() {
        bail!("no patch rules configured (use --rule or [[patch.rules]] in the config)");
    }
    Ok(PatchSet::compile(&rules)?.stop_when_all_matched(config.patch.stop_when_all_matched))
}

fn patch_files(files: &[PathBuf], set: &PatchSet, dry_run: bool) -> Result<()> {
    let mut hits = vec![0usize; set.rules().count()];
    let mut failed = 0usize;

    for path in files {
        let result = match pak::patch_file(path, set, dry_run) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("ERROR {}: {e}", path.display());
                failed += 1;
                continue;
            }
        };
        for res in &result.outcome.patched {
            for &(rule, n) in &res.hits {
                hits[rule] += n;
            }
        }
        for id in &result.outcome.skipped {
            println!("SKIP {} resource {id}: gzip payload does not inflate", path.display());
        }
        match &result.write {
            Some(outcome) => print_write(path, outcome),
            None if result.outcome.is_empty() => println!("UNCHANGED {}", path.display()),
            None => println!(
                "WOULD MODIFY {} ({} resources)",
                path.display(),
                result.outcome.patched.len()
            ),
        }
    }

    for (i, rule) in set.rules().enumerate() {
        let status = if hits[i] == 0 { "NOT FOUND" } else { "applied" };
        println!("{status}: {:?} -> {:?} ({} replacements)", rule.pattern, rule.replacement, hits[i]);
    }
    if failed > 0 {
        bail!("{failed} paks could not be patched");
    }
    Ok(())
}

fn print_write(path: &Path, outcome: &WriteOutcome) {
    match outcome {
        WriteOutcome::Written { after, .. } => println!("WROTE {} blake3={after}", path.display()),
        WriteOutcome::Unchanged { digest } => {
            println!("WARNING {} unchanged after write blake3={digest}", path.display())
        }
    }
}

fn run_crx(cmd: CrxCommand) -> Result<()> {
    match cmd {
        CrxCommand::Info { crx } => {
            let data = read(&crx)?;
            let pkg = CrxPackage::parse(&data)?;
            println!("format: CRX{}", pkg.format_version());
            println!("zip: offset={} length={}", pkg.zip_offset(), pkg.zip_length());
            println!("candidate keys: {}", pkg.public_keys().len());
            if let Some(id) = pkg.crx_id() {
                println!("declared id: {}", hex::encode(id));
            }
            let key = pkg.select_public_key()?;
            println!("key source: {:?}", key.source);
            println!("extension id: {}", crx::extension_id(key.bytes));
            if let Ok(manifest) = pkg.manifest() {
                if let Some(name) = manifest.get("name").and_then(|v| v.as_str()) {
                    println!("name: {name}");
                }
                if let Some(version) = manifest.get("version").and_then(|v| v.as_str()) {
                    println!("version: {version}");
                }
            }
        }
        CrxCommand::Extract { crx, output } => {
            let data = read(&crx)?;
            let pkg = CrxPackage::parse(&data)?;
            fs::create_dir_all(&output)?;
            pkg.extract(&output)?;
            println!("extracted {} to {}", crx.display(), output.display());
        }
        CrxCommand::Key { crx } => {
            println!("{}", crx::crx_public_key_base64(&read(&crx)?)?);
        }
        CrxCommand::InjectKey {
            key,
            manifest,
            output,
        } => {
            let key = resolve_key(&key)?;
            let updated = crx::inject_key(&read(&manifest)?, &key.to_base64())?;
            let output = output.unwrap_or(manifest);
            fs::write(&output, updated)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("{} key set, id {}", output.display(), key.id());
        }
        CrxCommand::Id { key } => {
            println!("{}", resolve_key(&key)?.id());
        }
    }
    Ok(())
}

fn resolve_key(input: &KeyInput) -> Result<ExtensionKey> {
    use base64::Engine;

    if let Some(path) = &input.crx {
        let data = read(path)?;
        let pkg = CrxPackage::parse(&data)?;
        return Ok(ExtensionKey::from_spki(pkg.select_public_key()?.bytes));
    }
    if let Some(b64) = &input.key_base64 {
        let spki = base64::engine::general_purpose::STANDARD
            .decode(b64.trim())
            .context("invalid base64 key")?;
        return Ok(ExtensionKey::from_spki(spki));
    }
    if let (Some(m), Some(e)) = (&input.modulus_hex, &input.exponent_hex) {
        let modulus = hex::decode(m.trim()).context("invalid modulus hex")?;
        let exponent = hex::decode(e.trim()).context("invalid exponent hex")?;
        return Ok(ExtensionKey::from_rsa_components(&modulus, &exponent));
    }
    bail!("one of --crx, --key-base64 or --modulus-hex/--exponent-hex is required")
}

fn run_prefs(cmd: PrefsCommand, config: &AppConfig) -> Result<()> {
    match cmd {
        PrefsCommand::Verify { stores } => {
            let prefs = open_prefs(&stores, config)?;
            let mut ok = true;
            for report in prefs.verify() {
                print_report(&report);
                ok &= report.is_valid();
            }
            if !ok {
                bail!("stored codes do not match the preference values");
            }
        }
        PrefsCommand::Recalc { stores, sets } => {
            let mut changes = BTreeMap::new();
            for arg in &sets {
                let (path, json) = arg
                    .split_once('=')
                    .with_context(|| format!("--set {arg:?} is not PATH=JSON"))?;
                let value = serde_json::from_str(json)
                    .with_context(|| format!("--set {path}: value is not JSON"))?;
                changes.insert(path.to_owned(), value);
            }
            let mut prefs = open_prefs(&stores, config)?;
            let count = prefs.commit(&changes)?;
            println!(
                "recomputed {count} codes in {} and {}",
                stores.prefs.display(),
                stores.registry.display()
            );
        }
    }
    Ok(())
}

fn open_prefs(stores: &StoreArgs, config: &AppConfig) -> Result<ProtectedPrefs> {
    let mut prefs_config = config.prefs.clone();
    if let Some(id) = &stores.device_id {
        prefs_config.device_id = id.clone();
    }
    let (file_calc, registry_calc) = prefs_config.calculators()?;
    let file = FileMacStore::load(&stores.prefs)
        .with_context(|| format!("failed to load {}", stores.prefs.display()))?;
    let registry = RegistryMacStore::load(&stores.registry)
        .with_context(|| format!("failed to load {}", stores.registry.display()))?;
    Ok(ProtectedPrefs::new(file, registry, file_calc, registry_calc)
        .with_tracked_paths(prefs_config.tracked_paths))
}

fn print_report(report: &VerifyReport) {
    for check in &report.checks {
        let status = if check.valid { "PASS" } else { "FAIL" };
        println!("[{}] {status} {}", report.domain, check.path);
    }
    match &report.super_mac {
        Some(c) if c.valid => println!("[{}] PASS super_mac", report.domain),
        Some(c) => println!(
            "[{}] FAIL super_mac (stored {}, computed {})",
            report.domain, c.expected, c.actual
        ),
        None => println!("[{}] no super_mac stored", report.domain),
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}
