/// Generic formatting code for a table of data extracted from some data structure, to be presented
/// columnar, as csv, as json, or for awk, and (except for json) with or without a header and with
/// or without named fields.
///
/// Every command that prints a table has a set of named formatters, each of which renders one
/// column from a row of data, a set of aliases that stand for several formatters, and a default
/// field list.  The user selects columns and output style with `--fmt=field,alias,control,...`.
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::io;

pub struct Help {
    pub fields: Vec<String>,
    pub aliases: Vec<(String, Vec<String>)>,
    pub defaults: String,
}

/// If `fmt` asks for help then print help produced by `f` and return true.

pub fn maybe_help<F>(fmt: &Option<String>, f: F) -> bool
where
    F: Fn() -> Help,
{
    match fmt {
        Some(s) if s.starts_with("help") => {
            print!("{}", help_text(f()));
            true
        }
        _ => false,
    }
}

fn help_text(mut help: Help) -> String {
    let mut s = "Syntax:\n  --fmt=(field|alias|control),...\n\nFields:\n".to_string();
    help.fields.sort();
    for f in help.fields {
        s += &format!("  {f}\n");
    }
    if !help.aliases.is_empty() {
        s += "\nAliases:\n";
        help.aliases.sort();
        for (name, fields) in help.aliases {
            s += &format!("  {name} --> {}\n", fields.join(","));
        }
    }
    s += &format!("\nDefaults:\n  {}\n", help.defaults);
    s += "\nControl:\n  awk\n  csv\n  csvnamed\n  fixed\n  json\n  header\n  noheader\n";
    s
}

/// Return a vector of the known fields in `spec` wrt the formatters, in the order given, and a
/// HashSet of any other strings found in `spec`.  Aliases are expanded in place.  It is an error if
/// no output fields were selected or if an unknown name was found that is not a control word.

pub fn parse_fields<'a, FmtT>(
    spec: &'a str,
    formatters: &HashMap<String, FmtT>,
    aliases: &'a HashMap<String, Vec<String>>,
) -> Result<(Vec<&'a str>, HashSet<&'a str>)> {
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if formatters.contains_key(x) {
            fields.push(x);
        } else if let Some(expansion) = aliases.get(x) {
            for f in expansion {
                if formatters.contains_key(f) {
                    fields.push(f.as_str());
                } else {
                    others.insert(f.as_str());
                }
            }
        } else if CONTROL.contains(&x) {
            others.insert(x);
        } else {
            bail!("Unknown field or control '{x}', try --fmt=help")
        }
    }
    if fields.is_empty() {
        bail!("No output fields were selected")
    }
    Ok((fields, others))
}

const CONTROL: [&str; 7] = ["awk", "csv", "csvnamed", "fixed", "json", "header", "noheader"];

#[derive(Debug, PartialEq)]
pub enum Style {
    Fixed,
    Csv,
    Json,
    Awk,
}

pub struct FormatOptions {
    pub style: Style,
    pub named: bool,  // csvnamed explicitly requested
    pub header: bool, // fixed gets a header unless noheader, csv only with header
}

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let named = others.contains("csvnamed");
    let style = if others.contains("csv") || named {
        Style::Csv
    } else if others.contains("json") {
        Style::Json
    } else if others.contains("awk") {
        Style::Awk
    } else {
        Style::Fixed
    };
    // json and awk get no header, even if one is requested
    let header = match style {
        Style::Fixed => !others.contains("noheader"),
        Style::Csv => others.contains("header"),
        Style::Json | Style::Awk => false,
    };
    FormatOptions {
        style,
        named,
        header,
    }
}

/// The `fields` are the names of formatting functions to get from the `formatters`, these are
/// applied to each element of `data` with the context `ctx` to produce the table.

pub fn format_data<'a, DataT, FmtT, CtxT>(
    output: &mut dyn io::Write,
    fields: &[&'a str],
    formatters: &HashMap<String, FmtT>,
    opts: &FormatOptions,
    data: &[DataT],
    ctx: CtxT,
) -> Result<()>
where
    FmtT: Fn(&DataT, CtxT) -> String,
    CtxT: Copy,
{
    let fmts = fields
        .iter()
        .map(|kwd| match formatters.get(*kwd) {
            Some(f) => Ok(f),
            None => bail!("No formatter for '{kwd}'"),
        })
        .collect::<Result<Vec<&FmtT>>>()?;
    let rows = data
        .iter()
        .map(|x| fmts.iter().map(|f| f(x, ctx)).collect::<Vec<String>>())
        .collect::<Vec<Vec<String>>>();

    match opts.style {
        Style::Csv => format_csv(output, fields, opts, rows),
        Style::Json => format_json(output, fields, rows),
        Style::Awk => format_awk(output, rows),
        Style::Fixed => format_fixed_width(output, fields, opts, rows),
    }
}

// Broken pipelines are common when output goes to `head` and the like, so a write error on stdout
// ends the output quietly.

fn quietly(r: io::Result<()>) -> Result<()> {
    match r {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(e.into()),
        Ok(()) => Ok(()),
    }
}

fn format_fixed_width(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: Vec<Vec<String>>,
) -> Result<()> {
    // The column width is the max across all the entries in the column, including the header if
    // present.
    let mut widths = if opts.header {
        fields.iter().map(|f| f.len()).collect::<Vec<usize>>()
    } else {
        vec![0; fields.len()]
    };
    for row in &rows {
        for (w, val) in widths.iter_mut().zip(row) {
            *w = usize::max(*w, val.len());
        }
    }

    let mut text = String::new();
    if opts.header {
        text += &padded_line(fields.iter().copied(), &widths);
    }
    for row in &rows {
        text += &padded_line(row.iter().map(|s| s.as_str()), &widths);
    }
    quietly(output.write_all(text.as_bytes()))
}

fn padded_line<'a>(vals: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let s = vals
        .zip(widths)
        .map(|(v, &w)| format!("{v:w$}"))
        .collect::<Vec<String>>()
        .join("  ");
    s.trim_end().to_string() + "\n"
}

fn format_csv(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: Vec<Vec<String>>,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);
    if opts.header {
        writer.write_record(fields)?;
    }
    for row in rows {
        if opts.named {
            writer.write_record(fields.iter().zip(row).map(|(f, v)| format!("{f}={v}")))?;
        } else {
            writer.write_record(row)?;
        }
    }
    quietly(writer.flush())
}

fn format_json(output: &mut dyn io::Write, fields: &[&str], rows: Vec<Vec<String>>) -> Result<()> {
    let mut objects = json::JsonValue::new_array();
    for row in rows {
        let mut obj = json::JsonValue::new_object();
        for (f, v) in fields.iter().zip(row) {
            obj[*f] = v.into();
        }
        objects.push(obj)?;
    }
    quietly(output.write_all(json::stringify(objects).as_bytes()))
}

// awk output: fields are space-separated and spaces are not allowed within fields, they are
// replaced by `_`.

fn format_awk(output: &mut dyn io::Write, rows: Vec<Vec<String>>) -> Result<()> {
    let mut text = String::new();
    for row in rows {
        text += &row
            .iter()
            .map(|v| v.replace(' ', "_"))
            .collect::<Vec<String>>()
            .join(" ");
        text += "\n";
    }
    quietly(output.write_all(text.as_bytes()))
}

#[cfg(test)]
type TestDatum<'a> = &'a (i32, &'static str);

#[cfg(test)]
fn test_table() -> (
    HashMap<String, &'static dyn Fn(TestDatum, ()) -> String>,
    HashMap<String, Vec<String>>,
) {
    fn format_num(d: TestDatum, _: ()) -> String {
        d.0.to_string()
    }
    fn format_name(d: TestDatum, _: ()) -> String {
        d.1.to_string()
    }
    let mut formatters: HashMap<String, &'static dyn Fn(TestDatum, ()) -> String> = HashMap::new();
    formatters.insert("num".to_string(), &format_num);
    formatters.insert("name".to_string(), &format_name);
    let mut aliases = HashMap::new();
    aliases.insert("all".to_string(), vec!["num".to_string(), "name".to_string()]);
    (formatters, aliases)
}

#[cfg(test)]
fn render(spec: &str) -> Result<String> {
    let (formatters, aliases) = test_table();
    let (fields, others) = parse_fields(spec, &formatters, &aliases)?;
    let opts = standard_options(&others);
    let mut out = vec![];
    format_data(&mut out, &fields, &formatters, &opts, &[(7, "a b"), (1234, "c")], ())?;
    Ok(String::from_utf8(out).unwrap())
}

#[test]
fn test_format_styles() {
    assert!(render("all").unwrap() == "num   name\n7     a b\n1234  c\n");
    assert!(render("name,noheader").unwrap() == "a b\nc\n");
    assert!(render("num,name,csv").unwrap() == "7,a b\n1234,c\n");
    assert!(render("num,csvnamed,header").unwrap() == "num\nnum=7\nnum=1234\n");
    assert!(render("all,awk").unwrap() == "7 a_b\n1234 c\n");
    assert!(render("num,json").unwrap() == r#"[{"num":"7"},{"num":"1234"}]"#);
}

#[test]
fn test_format_errors() {
    assert!(render("csv").is_err());
    assert!(render("num,bogus").is_err());
}

#[test]
fn test_help_text() {
    let (formatters, aliases) = test_table();
    let text = help_text(Help {
        fields: formatters.keys().cloned().collect(),
        aliases: aliases.into_iter().collect(),
        defaults: "num".to_string(),
    });
    assert!(text.contains("Fields:\n  name\n  num\n"));
    assert!(text.contains("  all --> num,name\n"));
}
