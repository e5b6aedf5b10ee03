// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    anyhow::{Context, Result},
    clap::{Arg, ArgMatches, Command},
    log::{info, LevelFilter},
    std::{path::PathBuf, sync::Arc, time::Duration},
    tugger_code_signing::{
        resolve_publisher, CancellationToken, CertificateSelection, DigestAlgorithm,
        DuctToolRunner, ExitCode, LocalKeyBackend, ProviderSet, SignOptions, SignRequest,
        Signer, SigningEngine, SigningError, SigningKeyBackend, ToolEnvironment, ToolSet,
        DEFAULT_MAX_CONCURRENCY, DEFAULT_TOOL_TIMEOUT, SUPPORTED_DIGESTS,
    },
};

const SIGN_ABOUT: &str = "\
Sign files and the content of the containers holding them.

Each INPUT is a path or a glob pattern relative to the base directory.
Containers (zip, VSIX, APPX, APPX bundles, CAB, NuGet packages) are opened
and their content is signed recursively before the container is repacked.
Files already signed during the run are not signed again.

By default inputs are signed in place. With --output, inputs are copied to
the output and the copies are signed. A single input may be written to an
exact file name. Multiple inputs are written into a directory.

The file given to --file-list holds one glob pattern per line. Lines
starting with ! exclude matches. Only container content matching these
patterns is signed.

Exit status is 0 on success, 1 if any file failed to sign, 2 for invalid
options and 3 if no inputs were found.
";

fn parse_seconds(matches: &ArgMatches, name: &str) -> Result<Option<Duration>, SigningError> {
    match matches.value_of(name) {
        Some(value) => value
            .parse::<u64>()
            .map(|v| Some(Duration::from_secs(v)))
            .map_err(|_| {
                SigningError::InvalidOption(format!("--{} must be a number of seconds", name))
            }),
        None => Ok(None),
    }
}

fn sign_options(args: &ArgMatches) -> Result<SignOptions, SigningError> {
    let mut options = SignOptions::default();

    if let Some(value) = args.value_of("application_name") {
        options.set_application_name(value);
    }
    if let Some(value) = args.value_of("publisher_name") {
        options.set_publisher_name(value);
    }
    if let Some(value) = args.value_of("description") {
        options.set_description(value);
    }
    if let Some(value) = args.value_of("description_url") {
        options.set_description_url(value)?;
    }
    if let Some(value) = args.value_of("file_digest") {
        options.set_file_digest(DigestAlgorithm::try_from(value)?);
    }
    if let Some(value) = args.value_of("timestamp_url") {
        options.set_timestamp_url(value)?;
    }
    if let Some(value) = args.value_of("timestamp_digest") {
        options.set_timestamp_digest(DigestAlgorithm::try_from(value)?);
    }
    if let Some(value) = args.value_of("max_concurrency") {
        let value = value.parse::<usize>().map_err(|_| {
            SigningError::InvalidOption("--max-concurrency must be a positive integer".into())
        })?;
        options.set_max_concurrency(value)?;
    }

    Ok(options)
}

fn certificate_selection(args: &ArgMatches) -> CertificateSelection {
    if let Some(path) = args.value_of("certificate_file") {
        CertificateSelection::file(path, args.value_of("password").map(|s| s.to_string()))
    } else if let Some(subject) = args.value_of("certificate_subject") {
        CertificateSelection::SubjectName(subject.to_string())
    } else if let Some(thumbprint) = args.value_of("certificate_thumbprint") {
        CertificateSelection::Thumbprint(thumbprint.to_string())
    } else {
        CertificateSelection::Auto
    }
}

fn command_sign(args: &ArgMatches) -> Result<ExitCode> {
    let options = sign_options(args)?;

    let mut backend = LocalKeyBackend::new(certificate_selection(args));
    if let Some(path) = args.value_of("certificate_pem") {
        backend.set_certificate_pem_file(path)?;
    }

    let mut tools = ToolSet::discover();
    tools.set_verbose(args.occurrences_of("verbose") > 0);
    if let Some(timeout) = parse_seconds(args, "tool_timeout")? {
        tools.set_timeout(timeout);
    }

    let mut env = ToolEnvironment::new(tools, Arc::new(DuctToolRunner));
    env.publisher = resolve_publisher(&options, &backend)?;
    if let Some(timeout) = parse_seconds(args, "timeout")? {
        env.cancellation = CancellationToken::with_timeout(timeout);
    }

    match &env.publisher {
        Some(publisher) => info!("publisher identity: {}", publisher),
        None => info!("no publisher identity; package manifests will not be modified"),
    }

    let providers = ProviderSet::with_default_providers(&env, backend.key_handle());
    info!("signature providers: {}", providers.names().join(", "));

    let request = SignRequest {
        inputs: args
            .values_of("input")
            .map(|values| values.map(|s| s.to_string()).collect())
            .unwrap_or_default(),
        output: args.value_of("output").map(PathBuf::from),
        file_list: args.value_of("file_list").map(PathBuf::from),
        base_directory: match args.value_of("base_directory") {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir().context("resolving current directory")?,
        },
    };

    let signer = Signer::new(SigningEngine::new(options, providers, env));

    Ok(signer.sign(&request))
}

fn main_impl() -> Result<ExitCode> {
    let default_max_concurrency = DEFAULT_MAX_CONCURRENCY.to_string();
    let default_tool_timeout = DEFAULT_TOOL_TIMEOUT.as_secs().to_string();

    let app = Command::new("Recursive code signing of Windows artifacts")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    let app = app.subcommand(
        Command::new("sign")
            .about("Sign files and container content")
            .long_about(SIGN_ABOUT)
            .arg(
                Arg::new("input")
                    .required(true)
                    .multiple_occurrences(true)
                    .multiple_values(true)
                    .help("Files or glob patterns to sign"),
            )
            .arg(
                Arg::new("application_name")
                    .long("application-name")
                    .takes_value(true)
                    .help("Application name recorded in ClickOnce deployment manifests"),
            )
            .arg(
                Arg::new("publisher_name")
                    .long("publisher-name")
                    .takes_value(true)
                    .help("Publisher identity written into package manifests"),
            )
            .arg(
                Arg::new("description")
                    .long("description")
                    .takes_value(true)
                    .help("Description of the signed content"),
            )
            .arg(
                Arg::new("description_url")
                    .long("description-url")
                    .takes_value(true)
                    .help("URL with more information about the signed content"),
            )
            .arg(
                Arg::new("file_digest")
                    .long("file-digest")
                    .takes_value(true)
                    .possible_values(SUPPORTED_DIGESTS)
                    .default_value("sha256")
                    .help("Digest algorithm used to hash signed files"),
            )
            .arg(
                Arg::new("timestamp_url")
                    .long("timestamp-url")
                    .takes_value(true)
                    .help("RFC 3161 time-stamp server URL"),
            )
            .arg(
                Arg::new("timestamp_digest")
                    .long("timestamp-digest")
                    .takes_value(true)
                    .possible_values(SUPPORTED_DIGESTS)
                    .default_value("sha256")
                    .help("Digest algorithm requested from the time-stamp server"),
            )
            .arg(
                Arg::new("output")
                    .long("output")
                    .short('o')
                    .takes_value(true)
                    .help("Output file or directory. Inputs are signed in place if omitted"),
            )
            .arg(
                Arg::new("base_directory")
                    .long("base-directory")
                    .short('b')
                    .takes_value(true)
                    .help("Directory inputs are relative to. Defaults to the current directory"),
            )
            .arg(
                Arg::new("max_concurrency")
                    .long("max-concurrency")
                    .short('m')
                    .takes_value(true)
                    .default_value(&default_max_concurrency)
                    .help("Maximum number of concurrent signing operations"),
            )
            .arg(
                Arg::new("file_list")
                    .long("file-list")
                    .takes_value(true)
                    .help("File of glob patterns selecting container content to sign"),
            )
            .arg(
                Arg::new("certificate_file")
                    .long("certificate-file")
                    .takes_value(true)
                    .conflicts_with_all(&["certificate_subject", "certificate_thumbprint"])
                    .help("PFX file holding the signing certificate and key"),
            )
            .arg(
                Arg::new("password")
                    .long("password")
                    .takes_value(true)
                    .requires("certificate_file")
                    .help("Password of the PFX file"),
            )
            .arg(
                Arg::new("certificate_subject")
                    .long("certificate-subject")
                    .takes_value(true)
                    .conflicts_with("certificate_thumbprint")
                    .help("Subject name of a certificate in the system certificate store"),
            )
            .arg(
                Arg::new("certificate_thumbprint")
                    .long("certificate-thumbprint")
                    .takes_value(true)
                    .help("SHA-1 thumbprint of a certificate in the system certificate store"),
            )
            .arg(
                Arg::new("certificate_pem")
                    .long("certificate-pem")
                    .takes_value(true)
                    .help("PEM encoded public certificate used to derive the publisher identity"),
            )
            .arg(
                Arg::new("tool_timeout")
                    .long("tool-timeout")
                    .takes_value(true)
                    .default_value(&default_tool_timeout)
                    .help("Seconds a single tool invocation may run"),
            )
            .arg(
                Arg::new("timeout")
                    .long("timeout")
                    .takes_value(true)
                    .help("Seconds the whole run may take before outstanding work is cancelled"),
            ),
    );

    let matches = app.get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("sign", args)) => command_sign(args),
        _ => Err(SigningError::InvalidOption("a subcommand is required".into()).into()),
    }
}

fn main() {
    let exit_code = match main_impl() {
        Ok(code) => code.code(),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            match err.downcast_ref::<SigningError>() {
                Some(e) => ExitCode::from_error(e).code(),
                None => ExitCode::InvalidOptions.code(),
            }
        }
    };

    std::process::exit(exit_code)
}
