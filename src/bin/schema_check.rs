//! Load schema DSL files and print what they declare.
//!
//! Usage:
//!   schema_check [OPTIONS] FILE.hl7s ...
//!
//! Options:
//!   --tree, -t   Print each message as a structure outline instead of the slot tables
//!
//! Exit code 1 if any file fails to load.

use hl7tree::registry::SchemaRegistry;
use hl7tree::slot::{GroupSchema, SegmentSchema};
use hl7tree::StructureKind;
use std::path::Path;

fn print_segment(seg: &SegmentSchema) {
    println!("segment {} ({} fields)", seg.name(), seg.len());
    for f in seg.fields() {
        let mut attrs = Vec::new();
        if f.is_required() {
            attrs.push("required".to_string());
        }
        attrs.push(format!("reps {}", f.repetitions()));
        if let Some(n) = f.length_limit() {
            attrs.push(format!("len {}", n));
        }
        if let Some(t) = f.table_id() {
            attrs.push(format!("table {:04}", t));
        }
        println!(
            "  {:>3} {:<6} {:<40} {}",
            f.position(),
            f.datatype().name(),
            f.description(),
            attrs.join(", ")
        );
    }
}

fn print_group(kind: &str, group: &GroupSchema) {
    println!("{} {}", kind, group.name());
    for s in group.slots() {
        let card = match (s.is_required(), s.is_repeating()) {
            (true, true) => "1..*",
            (true, false) => "1..1",
            (false, true) => "0..*",
            (false, false) => "0..1",
        };
        let target = s.descriptor().name();
        if target == s.name() {
            println!("  {:<20} {} {}", s.name(), card, s.kind());
        } else {
            println!("  {:<20} {} {} {}", s.name(), card, s.kind(), target);
        }
    }
}

/// Outline of a group: `[ ]` optional, `{ }` repeating, as in HL7 abstract message syntax.
fn print_outline(group: &GroupSchema, depth: usize) {
    for s in group.slots() {
        let (open, close) = match (s.is_required(), s.is_repeating()) {
            (true, false) => ("", ""),
            (true, true) => ("{ ", " }"),
            (false, false) => ("[ ", " ]"),
            (false, true) => ("[{ ", " }]"),
        };
        let indent = "  ".repeat(depth);
        match (s.kind(), s.descriptor().group_schema()) {
            (StructureKind::Group, Some(g)) => {
                println!("{}{}--- {} begin", indent, open, s.name());
                print_outline(g, depth + 1);
                println!("{}--- {} end{}", indent, s.name(), close);
            }
            _ => println!("{}{}{}{}", indent, open, s.name(), close),
        }
    }
}

fn check(path: &Path, tree: bool) -> anyhow::Result<()> {
    let reg = SchemaRegistry::load_file(path)?;
    println!(
        "{}: version {}: {} datatypes, {} segments, {} groups, {} messages",
        path.display(),
        reg.version(),
        reg.datatypes().count(),
        reg.segments().count(),
        reg.groups().count(),
        reg.messages().count()
    );
    if tree {
        for m in reg.messages() {
            println!("message {}", m.name());
            print_outline(m, 1);
        }
        return Ok(());
    }
    for s in reg.segments() {
        print_segment(s);
    }
    for g in reg.groups() {
        print_group("group", g);
    }
    for m in reg.messages() {
        print_group("message", m);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let tree = if let Some(pos) = args.iter().position(|a| a == "--tree" || a == "-t") {
        args.remove(pos);
        true
    } else {
        false
    };
    if args.is_empty() {
        anyhow::bail!("usage: schema_check [--tree] FILE...");
    }

    let mut failed = 0usize;
    for arg in &args {
        let path = Path::new(arg);
        if let Err(e) = check(path, tree) {
            eprintln!("{}: {}", path.display(), e);
            failed += 1;
        }
    }
    if failed > 0 {
        eprintln!("schema_check: {} of {} file(s) failed", failed, args.len());
        std::process::exit(1);
    }
    Ok(())
}
