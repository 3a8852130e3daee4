/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::{env, process};

use dkim_keyfinder::{
    common::crypto::HashAlgorithm,
    recover::{find_modulus_hex, ModulusReport},
    Error, RecoveryConfig,
};
use tracing::Level;

const USAGE: &str = concat!(
    "usage: find-modulus [--debug] [--exponents E[,E..]] ",
    "<digest1-hex> <signature1-base64> <digest2-hex> <signature2-base64> <sha1|sha256|sha512>"
);

struct Args {
    debug: bool,
    exponents: Option<Vec<u32>>,
    positional: Vec<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args {
        debug: false,
        exponents: None,
        positional: Vec::new(),
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--debug" => parsed.debug = true,
            "--exponents" => {
                let value = args.next().ok_or("--exponents needs a value")?;
                parsed.exponents = Some(
                    value
                        .split(',')
                        .map(|e| e.trim().parse::<u32>())
                        .collect::<Result<_, _>>()
                        .map_err(|err| format!("invalid exponent list {value:?}: {err}"))?,
                );
            }
            "-h" | "--help" => return Err(String::new()),
            _ => parsed.positional.push(arg),
        }
    }

    if parsed.positional.len() != 5 {
        return Err(format!(
            "expected 5 arguments, found {}",
            parsed.positional.len()
        ));
    }
    Ok(parsed)
}

fn main() {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            if !err.is_empty() {
                eprintln!("find-modulus: {err}");
            }
            eprintln!("{USAGE}");
            process::exit(1);
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.debug { Level::DEBUG } else { Level::INFO })
        .try_init();

    let hash = match args.positional[4].parse::<HashAlgorithm>() {
        Ok(hash) => hash,
        Err(_) => {
            eprintln!("find-modulus: unsupported hash function {:?}", args.positional[4]);
            process::exit(1);
        }
    };
    let mut config = RecoveryConfig::new().with_hash(hash);
    if let Some(exponents) = args.exponents {
        config = config.with_exponents(exponents);
    }

    let report = match find_modulus_hex(
        &args.positional[0],
        &args.positional[1],
        &args.positional[2],
        &args.positional[3],
        &config,
    ) {
        Ok(report) => {
            if !report.is_found() {
                tracing::info!(context = "find-modulus", "No common modulus found.");
            }
            report
        }
        Err(err @ (Error::SignatureLengthMismatch | Error::DuplicateSignature)) => {
            tracing::error!(context = "find-modulus", reason = %err, "Pair rejected.");
            ModulusReport::not_found()
        }
        Err(err) => {
            eprintln!("find-modulus: {err}");
            process::exit(2);
        }
    };

    match serde_json::to_string(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            eprintln!("find-modulus: {err}");
            process::exit(2);
        }
    }
}
