// Print the job slot utilization of each passive resource (node) of a run, averaged over the window
// from the pool's first record to the stop time.  The totals across pools go to the log.
//
// The fields are:
//
//  - name is the name of the pool, taken from its log file
//  - capacity is the largest number of available slots the pool ever reported
//  - free is the time-weighted average number of available slots
//  - used is capacity - free
//  - utilization is used / capacity, or blank for a pool without slots
//
// Pools are printed in the order of their names.

use crate::format;
use crate::input::Run;
use crate::PrintArgs;

use anyhow::Result;
use simlog::{read_passive_pools, PassiveUtilizationAggregator, PoolUtilization, TracingObserver};
use std::collections::HashMap;
use std::io;

pub fn print_pools(output: &mut dyn io::Write, run: &Run, print_args: &PrintArgs) -> Result<()> {
    let observer = TracingObserver;
    let pools = read_passive_pools(&run.files.passive)?;
    let passive = PassiveUtilizationAggregator::new(&observer).aggregate(&pools, run.stop_time)?;
    tracing::info!(
        "{} pools, {:.4} of {} slots used on average, utilization {:.4}",
        passive.pools.len(),
        passive.average_used_slots,
        passive.total_capacity,
        passive.utilization_ratio
    );

    let mut rows = passive.pools;
    rows.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));

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

const FMT_DEFAULTS: &str = "name,capacity,used,utilization";

type Datum<'a> = &'a PoolUtilization;

fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(Datum, ()) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(Datum, ()) -> String> = HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("name".to_string(), &format_name);
    formatters.insert("capacity".to_string(), &format_capacity);
    formatters.insert("free".to_string(), &format_free);
    formatters.insert("used".to_string(), &format_used);
    formatters.insert("utilization".to_string(), &format_utilization);
    aliases.insert(
        "all".to_string(),
        vec![
            "name".to_string(),
            "capacity".to_string(),
            "free".to_string(),
            "used".to_string(),
            "utilization".to_string(),
        ],
    );
    (formatters, aliases)
}

fn format_name(d: Datum, _: ()) -> String {
    d.name.to_string()
}

fn format_capacity(d: Datum, _: ()) -> String {
    d.capacity.to_string()
}

fn format_free(d: Datum, _: ()) -> String {
    format!("{:.2}", d.average_available)
}

fn format_used(d: Datum, _: ()) -> String {
    format!("{:.2}", d.average_used)
}

fn format_utilization(d: Datum, _: ()) -> String {
    match d.utilization() {
        Some(u) => format!("{u:.4}"),
        None => "".to_string(),
    }
}

#[test]
fn test_print_pools() {
    let run = crate::input::load_run(std::path::Path::new("../tests/simlog/run1"), None).unwrap();
    let mut out = vec![];
    print_pools(
        &mut out,
        &run,
        &PrintArgs {
            fmt: Some("all,csv,header".to_string()),
        },
    )
    .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text == "name,capacity,free,used,utilization\n\
                 State_of_Passive_Resource_Tuple_node0,4,1.60,2.40,0.6000\n");
}
