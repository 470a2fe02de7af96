use clap::{value_parser, Arg, ArgAction, Command};
use monolink_core::{
    load_manifest, run_consolidation, BuildOptions, Orchestrator, ProcessBuildTool, RunError,
    RunReport,
};
use monolink_policy::{resolve_policies, BuildConfig, LinkageMode, LinkagePolicy};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit code for configuration errors (manifest, graph, policy).
const EXIT_CONFIG: i32 = 2;
/// Exit code for build failures.
const EXIT_BUILD: i32 = 3;
/// Exit code for verification failures.
const EXIT_VERIFY: i32 = 4;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Command::new("monolink")
        .version(monolink_core::VERSION)
        .about("Builds a native-library dependency graph under one linkage policy")
        .subcommand_required(true)
        .subcommand(
            Command::new("build")
                .about("Build, verify, and consolidate the manifest graph")
                .arg(
                    Arg::new("manifest")
                        .long("manifest")
                        .short('m')
                        .default_value("build.yml")
                        .value_parser(value_parser!(PathBuf))
                        .help("Build manifest path"),
                )
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .default_value("0")
                        .value_parser(value_parser!(usize))
                        .help("Concurrent node builds (0 = host parallelism)"),
                )
                .arg(
                    Arg::new("verify-retries")
                        .long("verify-retries")
                        .default_value("1")
                        .value_parser(value_parser!(u32))
                        .help("Rebuild attempts allowed after a verification failure"),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Ignore freshness and rebuild every node"),
                )
                .arg(
                    Arg::new("out-dir")
                        .long("out-dir")
                        .value_parser(value_parser!(PathBuf))
                        .help("Override the manifest's output directory"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Emit the run report as JSON"),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Print the runtime-linkage directives of an artifact")
                .arg(
                    Arg::new("artifact")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Artifact to inspect"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Emit the inspection as JSON"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify an artifact against a linkage policy")
                .arg(
                    Arg::new("artifact")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Artifact to verify"),
                )
                .arg(
                    Arg::new("linkage")
                        .long("linkage")
                        .default_value("static")
                        .value_parser(value_parser!(LinkageMode))
                        .help("Expected linkage mode"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .default_value("release")
                        .value_parser(value_parser!(BuildConfig))
                        .help("Expected build configuration"),
                ),
        );

    let matches = cli.get_matches();

    let code = match matches.subcommand() {
        Some(("build", args)) => {
            let manifest = args.get_one::<PathBuf>("manifest").unwrap().clone();
            let options = BuildOptions {
                workers: *args.get_one::<usize>("workers").unwrap(),
                verify_retries: *args.get_one::<u32>("verify-retries").unwrap(),
                force: args.get_flag("force"),
                out_dir: PathBuf::new(), // replaced from the manifest below
            };
            let out_dir = args.get_one::<PathBuf>("out-dir").cloned();
            run_build(&manifest, options, out_dir, args.get_flag("json")).await
        }
        Some(("inspect", args)) => run_inspect(
            args.get_one::<PathBuf>("artifact").unwrap(),
            args.get_flag("json"),
        ),
        Some(("verify", args)) => run_verify(
            args.get_one::<PathBuf>("artifact").unwrap(),
            LinkagePolicy::new(
                *args.get_one::<LinkageMode>("linkage").unwrap(),
                *args.get_one::<BuildConfig>("config").unwrap(),
            ),
        ),
        _ => unreachable!("subcommand required"),
    };

    std::process::exit(code);
}

async fn run_build(
    manifest_path: &std::path::Path,
    mut options: BuildOptions,
    out_dir_override: Option<PathBuf>,
    json: bool,
) -> i32 {
    let prepared = prepare_build(manifest_path);
    let (manifest, graph, policies) = match prepared {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return EXIT_CONFIG;
        }
    };

    options.out_dir = out_dir_override.unwrap_or_else(|| manifest.out_dir.clone());
    let requested = manifest.requested_policy();
    let tool = Arc::new(ProcessBuildTool::new(
        manifest.tool.command.clone(),
        manifest.tool.args.clone(),
    ));

    let out_dir = options.out_dir.clone();
    let orchestrator = Orchestrator::new(graph, policies, tool, options);

    let mut report = RunReport::begin(requested);
    report.nodes = orchestrator.build_all().await;
    report.groups = run_consolidation(&manifest, &report.nodes, &out_dir);

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("failed to render report: {e}"),
        }
    } else {
        print!("{}", report.render_text());
    }
    report.exit_code()
}

#[allow(clippy::type_complexity)]
fn prepare_build(
    manifest_path: &std::path::Path,
) -> Result<
    (
        monolink_core::Manifest,
        monolink_core::BuildGraph,
        std::collections::BTreeMap<String, LinkagePolicy>,
    ),
    RunError,
> {
    let manifest = load_manifest(manifest_path)?;
    let graph = manifest.build_graph()?;
    let policies = resolve_policies(
        manifest.requested_policy(),
        &manifest.overrides(),
        &graph.node_names(),
        &graph.edges(),
    )?;
    Ok((manifest, graph, policies))
}

fn run_inspect(artifact: &std::path::Path, json: bool) -> i32 {
    match monolink_artifact::inspect(artifact) {
        Ok(inspection) => {
            if json {
                match serde_json::to_string_pretty(&inspection) {
                    Ok(text) => println!("{text}"),
                    Err(e) => eprintln!("failed to render inspection: {e}"),
                }
            } else {
                println!(
                    "{} ({}, {} objects): {}",
                    inspection.artifact.path.display(),
                    inspection.artifact.kind,
                    inspection.objects,
                    inspection.directives
                );
            }
            0
        }
        Err(e) => {
            eprintln!("{e}");
            EXIT_BUILD
        }
    }
}

fn run_verify(artifact: &std::path::Path, policy: LinkagePolicy) -> i32 {
    let inspection = match monolink_artifact::inspect(artifact) {
        Ok(inspection) => inspection,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_BUILD;
        }
    };
    let report = monolink_artifact::verify(&inspection, &policy);
    if report.passed {
        println!("{}: ok ({})", artifact.display(), report.expected);
        0
    } else {
        let detail = report
            .mismatch_detail()
            .unwrap_or_else(|| "verification failed".to_string());
        eprintln!("{}: {detail}", artifact.display());
        EXIT_VERIFY
    }
}
