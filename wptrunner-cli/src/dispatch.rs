// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::ExpectedError,
    output::{Color, OutputContext, OutputOpts, OutputWriter, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufWriter, Write},
    sync::Arc,
};
use tracing::{info, warn};
use wpt_metadata::{TestType, WptExitCode};
use wpt_runner::{
    config::{Processes, TestGrouping, WptConfig},
    list::{Test, TestFilter, TestList},
    product::{DEFAULT_BASE_URL, ProductArgs, ProductRegistry},
    reporter::{ReporterBuilder, StructuredReporter, events::RunStats},
    runner::ManagerGroupBuilder,
    signal::SignalHandlerKind,
    worker::{WorkerLauncher, serve_stdio},
};

/// Runs web-platform-tests against a browser, supervising browser and worker processes.
#[derive(Debug, Parser)]
#[command(name = "wptrunner", version, styles = clap_styles::style())]
pub struct WptrunnerApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    config_opts: ConfigOpts,

    #[command(subcommand)]
    command: Command,
}

impl WptrunnerApp {
    /// Initializes logging and returns the output context.
    pub fn init_output(&self) -> OutputContext {
        match &self.command {
            // Standard output carries the worker protocol, and logs may be captured by the runner.
            Command::Worker { .. } => OutputOpts {
                color: Color::Never,
                ..self.output
            }
            .init(),
            Command::Run(_) | Command::List(_) => self.output.init(),
        }
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(
        self,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32, ExpectedError> {
        match self.command {
            Command::Run(opts) => opts.exec(&self.config_opts, output, output_writer),
            Command::List(opts) => opts.exec(output_writer),
            Command::Worker {
                product,
                product_args_json,
            } => exec_worker(&product, &product_args_json),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run tests from a manifest
    Run(Box<RunOpts>),

    /// List the tests a run would consider
    List(ListOpts),

    /// Serve a worker over standard input and output
    #[command(name = "__worker", hide = true)]
    Worker {
        /// The product whose executors to create
        #[arg(long)]
        product: String,

        /// Product arguments, serialized as JSON
        #[arg(long)]
        product_args_json: String,
    },
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: ./wptrunner.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Configuration profile to use
    #[arg(
        long,
        short = 'P',
        global = true,
        value_name = "PROFILE",
        env = "WPTRUNNER_PROFILE",
        default_value = WptConfig::DEFAULT_PROFILE
    )]
    profile: String,
}

impl ConfigOpts {
    fn make_config(&self) -> Result<WptConfig, ExpectedError> {
        Ok(WptConfig::from_sources(
            Utf8Path::new("."),
            self.config_file.as_deref(),
        )?)
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Test selection")]
struct TestSelectionOpts {
    /// Path to the JSON test manifest
    #[arg(long, short = 'm', value_name = "PATH")]
    manifest: Utf8PathBuf,

    /// Only consider tests whose ID starts with PREFIX (may be repeated)
    #[arg(long = "include", value_name = "PREFIX")]
    include: Vec<String>,

    /// Only consider tests with TAG (may be repeated)
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    /// Only consider tests of this type (may be repeated)
    #[arg(long = "test-type", value_name = "TYPE", value_parser = parse_test_type)]
    test_types: Vec<TestType>,
}

impl TestSelectionOpts {
    /// Reads the manifest and returns the selected tests, grouped by type.
    fn select(&self) -> Result<BTreeMap<TestType, Vec<Arc<Test>>>, ExpectedError> {
        let test_list = TestList::from_manifest_path(&self.manifest)?;
        let mut filter = TestFilter::new();
        filter.set_include(&self.include).set_tags(&self.tags);

        Ok(test_list
            .test_types()
            .into_iter()
            .filter(|test_type| self.test_types.is_empty() || self.test_types.contains(test_type))
            .map(|test_type| (test_type, test_list.select(test_type, &filter)))
            .filter(|(_, tests)| !tests.is_empty())
            .collect())
    }
}

fn parse_test_type(input: &str) -> Result<TestType, String> {
    TestType::ALL
        .into_iter()
        .find(|test_type| test_type.as_str() == input)
        .ok_or_else(|| {
            format!(
                "unknown test type (known types: {})",
                TestType::ALL.iter().join(", ")
            )
        })
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Product options")]
struct ProductOpts {
    /// The browser product to run
    #[arg(long, value_name = "NAME", default_value = "command")]
    product: String,

    /// Path to the browser binary
    #[arg(long, value_name = "PATH")]
    binary: Option<String>,

    /// Extra argument for the browser binary (may be repeated)
    #[arg(long = "binary-arg", value_name = "ARG", allow_hyphen_values = true)]
    binary_args: Vec<String>,

    /// Template turning a test preference into a browser argument, e.g. `--pref={name}={value}`
    #[arg(long, value_name = "TEMPLATE", allow_hyphen_values = true)]
    pref_arg: Option<String>,

    /// The URL tests are loaded from
    #[arg(long, value_name = "URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Product-specific setting (may be repeated)
    #[arg(long = "product-setting", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    settings: Vec<(String, String)>,
}

impl ProductOpts {
    fn to_product_args(&self, executor_command: Vec<String>) -> ProductArgs {
        ProductArgs {
            binary: self.binary.clone(),
            binary_args: self.binary_args.clone(),
            pref_arg: self.pref_arg.clone(),
            executor_command,
            base_url: self.base_url.clone(),
            extra: self.settings.iter().cloned().collect(),
        }
    }
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err("expected KEY=VALUE".to_owned()),
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Runner options")]
struct RunnerOpts {
    /// Number of browsers to run in parallel [possible values: integer, negative integer or
    /// "num-cpus"]
    #[arg(
        long,
        short = 'j',
        value_name = "N",
        env = "WPTRUNNER_PROCESSES",
        allow_hyphen_values = true
    )]
    processes: Option<Processes>,

    /// Consecutive initialization failures tolerated per runner
    #[arg(long, value_name = "N")]
    max_restarts: Option<usize>,

    /// Number of times to run each test
    #[arg(long, value_name = "N")]
    rerun: Option<usize>,

    /// Factor applied to test and initialization timeouts
    #[arg(long, value_name = "FACTOR")]
    timeout_multiplier: Option<f64>,

    /// Keep the browser running after unexpected results
    #[arg(long)]
    no_restart_on_unexpected: bool,

    /// Wait for the browser to be closed after each test
    #[arg(long)]
    pause_after_test: bool,

    /// Wait for the browser to be closed after unexpected results
    #[arg(long)]
    pause_on_unexpected: bool,

    /// How tests are split into groups: "single" or "by-dir=DEPTH"
    #[arg(long, value_name = "GROUPING")]
    test_grouping: Option<TestGrouping>,

    /// Where workers run
    #[arg(long, value_enum, default_value_t)]
    worker: WorkerKind,
}

impl RunnerOpts {
    fn to_builder(&self) -> ManagerGroupBuilder {
        let mut builder = ManagerGroupBuilder::default();
        if let Some(processes) = self.processes {
            builder.set_processes(processes);
        }
        if let Some(max_restarts) = self.max_restarts {
            builder.set_max_restarts(max_restarts);
        }
        if let Some(rerun) = self.rerun {
            builder.set_rerun(rerun);
        }
        if let Some(timeout_multiplier) = self.timeout_multiplier {
            builder.set_timeout_multiplier(timeout_multiplier);
        }
        if self.no_restart_on_unexpected {
            builder.set_restart_on_unexpected(false);
        }
        if self.pause_after_test {
            builder.set_pause_after_test(true);
        }
        if self.pause_on_unexpected {
            builder.set_pause_on_unexpected(true);
        }
        if let Some(test_grouping) = self.test_grouping {
            builder.set_test_grouping(test_grouping);
        }
        builder
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
enum WorkerKind {
    /// Run workers on threads in this process
    #[default]
    Thread,

    /// Run each worker as a separate wptrunner process
    Process,
}

#[derive(Debug, Args)]
struct RunOpts {
    #[command(flatten)]
    selection: TestSelectionOpts,

    #[command(flatten)]
    product_opts: ProductOpts,

    #[command(flatten)]
    runner_opts: RunnerOpts,

    /// Write a mozlog-style structured log to PATH ("-" for standard output)
    #[arg(long, value_name = "PATH")]
    log_mozlog: Option<Utf8PathBuf>,

    /// The command run for every test; placeholders are {url}, {test_id}, {test_type} and
    /// {timeout}
    #[arg(last = true, value_name = "COMMAND")]
    executor_command: Vec<String>,
}

impl RunOpts {
    fn exec(
        self,
        config_opts: &ConfigOpts,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32, ExpectedError> {
        let config = config_opts.make_config()?;
        let profile = config.profile(&config_opts.profile)?;

        let registry = ProductRegistry::builtin();
        let product = registry.get(&self.product_opts.product)?;
        let product_args = self
            .product_opts
            .to_product_args(self.executor_command.clone());
        product.check_args(&product_args)?;

        let selected = self.selection.select()?;
        let supported = product.supported_test_types();
        let selected: Vec<_> = selected
            .into_iter()
            .filter(|(test_type, _)| {
                let is_supported = supported.contains(test_type);
                if !is_supported {
                    warn!(
                        product = product.name(),
                        "skipping {test_type} tests: not supported by this product"
                    );
                }
                is_supported
            })
            .collect();

        let launcher = match self.runner_opts.worker {
            WorkerKind::Thread => WorkerLauncher::thread(product.executor_factory(&product_args)?),
            WorkerKind::Process => {
                let exe = std::env::current_exe()
                    .map_err(|err| ExpectedError::CurrentExeError { err })?;
                let args_json = serde_json::to_string(&product_args)
                    .map_err(|err| ExpectedError::ProductArgsJsonError { err })?;
                WorkerLauncher::process(
                    exe.to_string_lossy(),
                    vec![
                        "__worker".to_owned(),
                        "--product".to_owned(),
                        product.name().to_owned(),
                        "--product-args-json".to_owned(),
                        args_json,
                    ],
                )
            }
        };

        let mut group = self.runner_opts.to_builder().build(
            &profile,
            product.clone(),
            product_args,
            launcher,
            SignalHandlerKind::Standard,
        )?;

        let (mut stdout, stderr) = output_writer.split();
        let structured = match &self.log_mozlog {
            None => None,
            Some(path) if path.as_str() == "-" => Some(StructuredReporter::new(&mut stdout)),
            Some(path) => {
                let file = File::create(path).map_err(|err| {
                    ExpectedError::StructuredLogCreateError {
                        path: path.clone(),
                        err,
                    }
                })?;
                Some(StructuredReporter::new(BufWriter::new(file)))
            }
        };

        let mut reporter_builder = ReporterBuilder::default();
        reporter_builder
            .set_colorize(output.color.should_colorize(supports_color::Stream::Stderr))
            .set_verbose(output.verbose);
        let mut reporter = reporter_builder.build(stderr, structured);
        reporter.suite_start(selected.iter().flat_map(|(_, tests)| tests))?;

        info!(
            profile = profile.name(),
            product = product.name(),
            "running {}",
            selected.iter().map(|(test_type, _)| test_type).join(", ")
        );

        let stop_handle = group.stop_handle();
        let mut total = RunStats::default();
        let mut write_error = None;
        for (test_type, tests) in selected {
            if stop_handle.is_stopped() {
                break;
            }
            let stats = group.run(test_type, tests, |event| {
                if write_error.is_some() {
                    return;
                }
                if let Err(error) = reporter.report_event(&event) {
                    write_error = Some(error);
                    stop_handle.stop();
                }
            })?;
            total.merge(&stats);
        }

        if let Some(error) = write_error {
            return Err(error.into());
        }
        reporter.finish()?;
        Ok(total.exit_code())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
enum MessageFormat {
    /// One line per test
    #[default]
    Human,

    /// A JSON object mapping test types to test IDs
    Json,
}

#[derive(Debug, Args)]
struct ListOpts {
    #[command(flatten)]
    selection: TestSelectionOpts,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    message_format: MessageFormat,
}

impl ListOpts {
    fn exec(self, output_writer: &mut OutputWriter) -> Result<i32, ExpectedError> {
        let selected = self.selection.select()?;
        let (mut stdout, _) = output_writer.split();
        self.write(&selected, &mut stdout)
            .map_err(|err| ExpectedError::WriteError { err })?;
        Ok(WptExitCode::OK)
    }

    fn write(
        &self,
        selected: &BTreeMap<TestType, Vec<Arc<Test>>>,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        match self.message_format {
            MessageFormat::Human => {
                for (test_type, tests) in selected {
                    writeln!(writer, "{test_type}:")?;
                    for test in tests {
                        write!(writer, "    {}", test.id)?;
                        if let Some(reason) = &test.disabled {
                            write!(writer, " (disabled: {reason})")?;
                        }
                        writeln!(writer)?;
                    }
                }
            }
            MessageFormat::Json => {
                let tests: BTreeMap<_, Vec<_>> = selected
                    .iter()
                    .map(|(test_type, tests)| {
                        (
                            test_type.as_str(),
                            tests.iter().map(|test| test.id.as_str()).collect(),
                        )
                    })
                    .collect();
                let value = serde_json::json!({
                    "test-count": selected.values().map(Vec::len).sum::<usize>(),
                    "tests": tests,
                });
                serde_json::to_writer_pretty(&mut *writer, &value)?;
                writeln!(writer)?;
            }
        }
        writer.flush()
    }
}

fn exec_worker(product: &str, product_args_json: &str) -> Result<i32, ExpectedError> {
    let registry = ProductRegistry::builtin();
    let product = registry.get(product)?;
    let args: ProductArgs = serde_json::from_str(product_args_json)
        .map_err(|err| ExpectedError::ProductArgsJsonError { err })?;
    let factory = product.executor_factory(&args)?;
    serve_stdio(&*factory).map_err(|err| ExpectedError::WorkerIoError { err })?;
    Ok(WptExitCode::OK)
}
