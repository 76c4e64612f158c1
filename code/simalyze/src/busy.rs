// Print the busy-core series of a run: one row for every timestamp at which some core changed
// state, with the net change, the number of busy cores from that time on, and that number as a
// fraction of all cores.  The last row is at the stop time.
//
// The fields are:
//
//  - time is the simulation time in seconds
//  - delta is the net change in the number of busy cores at that time
//  - busy is the number of busy cores from that time until the next row
//  - utilization is busy divided by the number of cores, with four decimals
//
// For csvnamed the field names are as given above.

use crate::format;
use crate::input::{self, Run};
use crate::{ComputeArgs, PrintArgs};

use anyhow::Result;
use simlog::{utilization_table, TracingObserver, UtilizationRow};
use std::collections::HashMap;
use std::io;

pub fn print_busy(
    output: &mut dyn io::Write,
    run: &Run,
    compute_args: &ComputeArgs,
    print_args: &PrintArgs,
) -> Result<()> {
    let observer = TracingObserver;
    let active =
        input::active_aggregator(&observer, compute_args).aggregate(&run.active, run.stop_time)?;
    tracing::info!(
        "{} cores, overall utilization {:.4}",
        active.resource_count,
        active.overall_utilization
    );
    let rows = utilization_table(&active);

    let (formatters, aliases) = my_formatters();
    let spec = print_args.fmt.as_deref().unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    format::format_data(output, &fields, &formatters, &opts, &rows, ())
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help {
        fields: formatters.keys().cloned().collect::<Vec<String>>(),
        aliases: aliases.into_iter().collect::<Vec<(String, Vec<String>)>>(),
        defaults: FMT_DEFAULTS.to_string(),
    }
}

const FMT_DEFAULTS: &str = "time,busy,utilization";

type Datum<'a> = &'a UtilizationRow;

fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(Datum, ()) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(Datum, ()) -> String> = HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("time".to_string(), &format_time);
    formatters.insert("delta".to_string(), &format_delta);
    formatters.insert("busy".to_string(), &format_busy);
    formatters.insert("utilization".to_string(), &format_utilization);
    aliases.insert(
        "all".to_string(),
        vec![
            "time".to_string(),
            "delta".to_string(),
            "busy".to_string(),
            "utilization".to_string(),
        ],
    );
    (formatters, aliases)
}

fn format_time(d: Datum, _: ()) -> String {
    d.timestamp.to_string()
}

fn format_delta(d: Datum, _: ()) -> String {
    d.delta.to_string()
}

fn format_busy(d: Datum, _: ()) -> String {
    d.busy_cores.to_string()
}

fn format_utilization(d: Datum, _: ()) -> String {
    format!("{:.4}", d.utilization)
}

// This tests:
//  - the default fields against the run1 fixture, whose busy series is known
//  - that the series ends with an all-idle row at the stop time

#[test]
fn test_print_busy() {
    let run = input::load_run(std::path::Path::new("../tests/simlog/run1"), None).unwrap();
    let mut out = vec![];
    print_busy(
        &mut out,
        &run,
        &ComputeArgs::default(),
        &PrintArgs {
            fmt: Some("all,csv".to_string()),
        },
    )
    .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(
        text == "0,1,1,0.5000\n\
                 10,0,1,0.5000\n\
                 20,1,2,1.0000\n\
                 30,-1,1,0.5000\n\
                 60,1,2,1.0000\n\
                 70,-1,1,0.5000\n\
                 100,-1,0,0.0000\n"
    );
}
