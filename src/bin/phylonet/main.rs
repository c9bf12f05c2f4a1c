#![warn(missing_docs)]
//! The `phylonet` binary is a command line tool, using the `[phylonet]` crate.
//! It is made to execute common operations on phylogenetic trees and networks directly in the terminal.

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use indicatif::ProgressIterator;
use itertools::Itertools;
use phylonet::{
    generate_caterpillar, generate_tree,
    newick::{parse_newick_trees, ParseOptions},
    nexus::parse_nexus,
    tree::Tree,
};
use serde::Serialize;
use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
};
use tinytemplate::TinyTemplate;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// contains the struct representing the command line arguments
/// parsed by [`clap`] and used to execute this binary
pub mod cli;

type Error = Box<dyn std::error::Error>;
type Result<T> = std::result::Result<T, Error>;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Reads every tree of a newick or nexus file
fn read_trees(path: &Path, options: &ParseOptions) -> Result<Vec<Tree>> {
    let text = fs::read_to_string(path)?;
    let is_nexus = text
        .trim_start()
        .get(..6)
        .is_some_and(|header| header.eq_ignore_ascii_case("#NEXUS"));

    let trees = if is_nexus {
        parse_nexus(&text, options)?
            .into_iter()
            .map(|named| named.tree)
            .collect_vec()
    } else {
        parse_newick_trees(&text, options)?
    };
    debug!(path = ?path, trees = trees.len(), nexus = is_nexus, "read trees");

    Ok(trees)
}

fn write_trees(trees: &[Tree], output: Option<&Path>) -> Result<()> {
    let mut writer = BufWriter::new(match output {
        Some(path) => Box::new(File::create(path)?) as Box<dyn Write>,
        None => Box::new(io::stdout()) as Box<dyn Write>,
    });
    for tree in trees {
        writeln!(writer, "{}", tree.to_newick()?)?;
    }
    writer.flush()?;

    Ok(())
}

fn leaf_id(tree: &Tree, label: &str) -> Result<usize> {
    tree.get_by_label(label)
        .map(|node| node.id)
        .ok_or_else(|| format!("Leaf {label} not found in the tree").into())
}

#[derive(Serialize)]
struct Row {
    file: String,
    index: usize,
    nodes: usize,
    leaves: usize,
    hybrids: usize,
    time_tree: bool,
    length: String,
    height: String,
}

#[derive(Serialize)]
struct Context {
    rows: Vec<Row>,
}

static STATS: &str = "\
file\ttree\tnodes\tleaves\thybrids\ttime_tree\tlength\theight
{{ for row in rows }}{row.file}\t{row.index}\t{row.nodes}\t{row.leaves}\t{row.hybrids}\t{row.time_tree}\t{row.length}\t{row.height}
{{ endfor }}";

fn stats_row(file: &str, index: usize, tree: &Tree) -> Result<Row> {
    let root = tree.get_root()?;
    let height = tree.get(&root)?.height();

    Ok(Row {
        file: file.to_string(),
        index,
        nodes: tree.size()?,
        leaves: tree.n_leaves()?,
        hybrids: tree.get_hybrid_edges()?.len(),
        time_tree: tree.is_time_tree(),
        length: tree
            .length()
            .map_or_else(|_| "-".into(), |l| format!("{l}")),
        height: if height.is_nan() {
            "-".into()
        } else {
            format!("{height}")
        },
    })
}

fn run(args: cli::Args) -> Result<()> {
    let options = ParseOptions {
        require_rooted: args.rooted_only,
    };

    match args.command {
        cli::Commands::Stats { trees } => {
            let mut rows = vec![];
            for path in trees.iter().progress() {
                let file = path.display().to_string();
                for (i, tree) in read_trees(path, &options)?.iter().enumerate() {
                    rows.push(stats_row(&file, i, tree)?);
                }
            }

            let mut tt = TinyTemplate::new();
            tt.set_default_formatter(&tinytemplate::format_unescaped);
            tt.add_template("stats", STATS)?;
            print!("{}", tt.render("stats", &Context { rows })?);
        }
        cli::Commands::Reroot {
            tree,
            leaf,
            prop,
            output,
        } => {
            let mut trees = read_trees(&tree, &options)?;
            for tree in trees.iter_mut() {
                let id = leaf_id(tree, &leaf)?;
                tree.reroot(&id, prop)?;
            }
            write_trees(&trees, output.as_deref())?;
        }
        cli::Commands::Ladderise { tree, output } => {
            let mut trees = read_trees(&tree, &options)?;
            for tree in trees.iter_mut() {
                tree.ladderise()?;
            }
            write_trees(&trees, output.as_deref())?;
        }
        cli::Commands::Mrca {
            tree,
            leaves,
            output,
        } => {
            let trees = read_trees(&tree, &options)?;
            let mut clades = vec![];
            for tree in trees.iter() {
                let ids = leaves
                    .iter()
                    .map(|label| leaf_id(tree, label))
                    .collect::<Result<Vec<_>>>()?;
                match tree.get_mrca(&ids)? {
                    Some(mrca) => clades.push(tree.get_subtree(&mrca)?),
                    None => info!(leaves = ?leaves, "no common ancestor"),
                }
            }
            write_trees(&clades, output.as_deref())?;
        }
        cli::Commands::Print { tree, debug } => {
            for tree in read_trees(&tree, &options)? {
                if debug {
                    tree.print_debug()?;
                } else {
                    tree.print()?;
                }
            }
        }
        cli::Commands::Generate {
            tips,
            branch_lengths,
            caterpillar,
            output,
            trees,
        } => {
            let make_tree = |tips: usize, brlens: bool| {
                if caterpillar {
                    generate_caterpillar(tips, brlens)
                } else {
                    generate_tree(tips, brlens)
                }
            };

            if let Some(ntrees) = trees {
                let Some(output) = output else {
                    return Err(
                        "If you are generating multiple trees you must specify an output directory"
                            .into(),
                    );
                };
                fs::create_dir_all(&output)?;

                for i in (1..ntrees + 1).progress() {
                    let output = output.join(format!("{i}_{tips}_tips.nwk"));
                    make_tree(tips, branch_lengths)?.to_file(&output)?;
                }
            } else {
                let random = make_tree(tips, branch_lengths)?;
                if let Some(output) = output {
                    random.to_file(&output)?
                } else {
                    println!("{}", random.to_newick()?)
                }
            }
        }
        cli::Commands::Completion { shell } => {
            let mut cmd = cli::Args::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }

    Ok(())
}

fn main() {
    let args = cli::Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}
