// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    format::transfer_list::{self, BLOCK_SIZE, TransferList},
    util::NumBytes,
};

/// Number of commands and blocks per command type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Totals {
    commands: usize,
    blocks: u64,
}

fn compute_totals(transfer_list: &TransferList) -> BTreeMap<&'static str, Totals> {
    let mut result = BTreeMap::<_, Totals>::new();

    for command in &transfer_list.commands {
        let totals = result.entry(command.name()).or_default();
        totals.commands += 1;
        totals.blocks += command.ranges().num_blocks();
    }

    result
}

pub fn info_main(cli: &InfoCli) -> Result<()> {
    let transfer_list = transfer_list::read_file(&cli.transfer_list)
        .with_context(|| format!("Failed to parse transfer list: {:?}", cli.transfer_list))?;

    if !cli.quiet {
        println!("{transfer_list:#?}");
    }

    for (name, totals) in compute_totals(&transfer_list) {
        println!(
            "{name}: {} commands, {} blocks",
            totals.commands, totals.blocks
        );
    }

    match transfer_list.max_end() {
        Some(end) => {
            let size = u128::from(end) * u128::from(BLOCK_SIZE);
            println!("Image size: {:?}", NumBytes(size));
        }
        None => println!("Image size: <no block ranges>"),
    }

    Ok(())
}

/// Display transfer list information.
#[derive(Debug, Parser)]
pub struct InfoCli {
    /// Path to the transfer list.
    #[arg(
        short,
        long,
        value_name = "FILE",
        value_parser,
        default_value = "system.transfer.list"
    )]
    pub transfer_list: PathBuf,

    /// Don't print the full list of commands.
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_per_command() {
        let transfer_list: TransferList =
            "1\n4\nerase 2,0,10\nnew 4,0,2,5,6\nzero 2,6,10\nnew 2,2,3\n"
                .parse()
                .unwrap();
        let totals = compute_totals(&transfer_list);

        assert_eq!(
            totals.get("new"),
            Some(&Totals {
                commands: 2,
                blocks: 4
            })
        );
        assert_eq!(
            totals.get("erase"),
            Some(&Totals {
                commands: 1,
                blocks: 10
            })
        );
        assert_eq!(
            totals.get("zero"),
            Some(&Totals {
                commands: 1,
                blocks: 4
            })
        );
    }
}
