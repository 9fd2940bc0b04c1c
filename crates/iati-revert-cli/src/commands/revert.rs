use color_eyre::eyre::WrapErr;
use iati_revert_config::RevertConfig;
use iati_revert_services::{CodelistColumns, NarrativeOptions, ReversionOptions, Reverter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const DEFAULT_CODELISTS_DIR: &str = "codelists";

/// Settings for one run after flags and config file are merged.
#[derive(Debug, Clone)]
pub struct RevertArgs {
    pub input: PathBuf,
    pub codelists: PathBuf,
    pub columns: CodelistColumns,
    pub output: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub xml_declaration: bool,
    pub opts: ReversionOptions,
}

impl RevertArgs {
    /// Flags win over the config file, which wins over built-in defaults.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        input: PathBuf,
        codelists: Option<PathBuf>,
        output: Option<PathBuf>,
        report: Option<PathBuf>,
        target_version: Option<String>,
        drop_empty_narratives: bool,
        xml_declaration: bool,
        cfg: &RevertConfig,
    ) -> Self {
        let codelists = codelists
            .or_else(|| cfg.codelists_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CODELISTS_DIR));

        let mut columns = CodelistColumns::default();
        if let Some(c) = cfg.columns.as_ref() {
            if let Some(s) = c.source.clone() {
                columns.source = s;
            }
            if let Some(t) = c.target.clone() {
                columns.target = t;
            }
        }

        let mut opts = ReversionOptions::default();
        if let Some(v) = target_version.or_else(|| cfg.target_version.clone()) {
            opts.target_version = v;
        }
        opts.narrative = NarrativeOptions {
            drop_empty: drop_empty_narratives
                || cfg
                    .narrative
                    .as_ref()
                    .and_then(|n| n.drop_empty)
                    .unwrap_or(false),
        };

        let xml_declaration = xml_declaration
            || cfg
                .output
                .as_ref()
                .and_then(|o| o.xml_declaration)
                .unwrap_or(false);

        Self {
            input,
            codelists,
            columns,
            output,
            report,
            xml_declaration,
            opts,
        }
    }
}

pub fn run_revert(args: RevertArgs) -> color_eyre::Result<()> {
    tracing::debug!(
        event = "revert_args",
        input = ?args.input,
        codelists = ?args.codelists,
        output = ?args.output,
        report = ?args.report,
        target_version = %args.opts.target_version,
        drop_empty = args.opts.narrative.drop_empty
    );

    let codelists = iati_revert_services::load_codelists(&args.codelists, &args.columns)
        .wrap_err("loading codelists")?;
    let reverter = Reverter::new(&codelists, args.opts.clone());
    let (root, stats) = iati_revert_services::revert_file(&args.input, &reverter)?;

    match args.output.as_deref() {
        Some(path) => {
            let file = create(path)?;
            iati_revert_xml::write_document(BufWriter::new(file), &root, args.xml_declaration)?;
            tracing::info!("Converted document written to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let lock = stdout.lock();
            iati_revert_xml::write_document(lock, &root, args.xml_declaration)?;
        }
    }

    if let Some(path) = args.report.as_deref() {
        let mut w = BufWriter::new(create(path)?);
        serde_json::to_writer_pretty(&mut w, &stats)?;
        writeln!(w)?;
        w.flush()?;
        tracing::debug!(event = "report_written", path = %path.display());
    }
    Ok(())
}

fn create(path: &Path) -> color_eyre::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path).wrap_err_with(|| format!("creating {}", path.display()))
}
