use crate::CLAP_STYLING;
use clap::{arg, command};

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("harvest")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("harvest")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(command!("sites").about("List the listing sites harvest knows how to read"))
        .subcommand(
            command!("run")
                .about(
                    "Walk each site's paginated search results, fetch every listing found and \
                write the extracted unit records.",
                )
                .arg(
                    arg!(-s --"site" <SITE>)
                        .required(false)
                        .help("Site to harvest; may be given more than once")
                        .action(clap::ArgAction::Append)
                        .conflicts_with("all"),
                )
                .arg(
                    arg!(-a --"all")
                        .required(false)
                        .help("Harvest every known site")
                        .action(clap::ArgAction::SetTrue)
                        .conflicts_with("site"),
                )
                .arg(
                    arg!(-c --"config" <PATH>)
                        .required(false)
                        .help("JSON configuration file; flags below override its values"),
                )
                .arg(
                    arg!(-r --"renderer" <KIND>)
                        .required(false)
                        .help("Page renderer: http (plain fetches) or remote (render service)")
                        .value_parser(["http", "remote"]),
                )
                .arg(
                    arg!(-e --"endpoint" <URL>)
                        .required(false)
                        .help("Base URL of the render service used by --renderer remote"),
                )
                .arg(
                    arg!(-t --"max-concurrent" <NUM>)
                        .required(false)
                        .help("Upper bound on listing fetches in flight at once")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"pressure-ceiling" <FRACTION>)
                        .required(false)
                        .help("Pause new fetches while memory use is above this fraction (0-1]")
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    arg!(--"max-pages" <NUM>)
                        .required(false)
                        .help("Stop paginating a site after this many result pages")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(-o --"output" <DIR>)
                        .required(false)
                        .help("Directory that receives the record files or database"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Record output: json (one file per site) or sqlite")
                        .value_parser(["json", "sqlite"]),
                )
                .arg(
                    arg!(--"report-format" <FORMAT>)
                        .required(false)
                        .help("Run summary format: text or json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
}
