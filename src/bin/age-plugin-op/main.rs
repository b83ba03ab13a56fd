use std::fs::OpenOptions;
use std::io::{self, Write};
use std::process::exit;

use age_plugin_op::{
    run_identity_v1, run_recipient_v1, DebugLog, Identity, OpCli, SecretSource,
};
use gumdrop::Options;
use log::error;

#[derive(Debug, Options)]
struct PluginOptions {
    #[options(help = "print help message")]
    help: bool,

    #[options(
        help = "generate an identity for the SSH key at PATH",
        meta = "PATH"
    )]
    generate: Option<String>,

    #[options(help = "output to OUTPUT (default stdout)", meta = "OUTPUT")]
    output: Option<String>,

    #[options(help = "run as an age plugin", no_short, meta = "STATE-MACHINE")]
    age_plugin: Option<String>,
}

fn output_writer(output: Option<&str>) -> io::Result<Box<dyn Write>> {
    match output {
        Some(path) if path != "-" => {
            let mut options = OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            Ok(Box::new(options.open(path)?))
        }
        _ => Ok(Box::new(io::stdout())),
    }
}

fn generate(key_path: String, output: &mut dyn Write) -> Result<(), Box<dyn std::error::Error>> {
    // Confirm the vault item is reachable before minting an identity that
    // points at it.
    OpCli.fetch(&key_path)?;
    let identity = Identity::new(key_path);

    writeln!(
        output,
        "# created: {}",
        chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    )?;
    writeln!(output, "# recipient: {}", identity.to_recipient())?;
    writeln!(output)?;
    writeln!(output, "{}", identity)?;
    Ok(())
}

fn main() {
    env_logger::builder().format_timestamp(None).init();

    let opts = PluginOptions::parse_args_default_or_exit();

    if let Some(state_machine) = opts.age_plugin {
        let input = io::BufReader::new(io::stdin());
        let result = match state_machine.as_str() {
            "recipient-v1" => run_recipient_v1(input, io::stdout(), &OpCli, &mut DebugLog),
            "identity-v1" => run_identity_v1(input, io::stdout(), &OpCli, &mut DebugLog),
            other => {
                error!("unknown state machine: {}", other);
                exit(1);
            }
        };
        if let Err(e) = result {
            error!("{}", e);
            exit(1);
        }
    } else if let Some(key_path) = opts.generate {
        let mut output = match output_writer(opts.output.as_deref()) {
            Ok(output) => output,
            Err(e) => {
                error!("failed to open output: {}", e);
                exit(1);
            }
        };
        if let Err(e) = generate(key_path, &mut output) {
            error!("failed to generate identity: {}", e);
            exit(1);
        }
    } else {
        eprintln!("{}", PluginOptions::usage());
        exit(2);
    }
}
