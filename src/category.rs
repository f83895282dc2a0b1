//! Named data tables of a category index topic.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use scraper::{ElementRef, Html};

use crate::section::{self, TableRow};

static LEGACY_DETAILS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[details=(.*)\]").expect("BUG: hardcoded details regex is statically valid")
});

pub type DataTables = IndexMap<String, Vec<TableRow>>;

/// Every table introduced by `<details><summary>NAME</summary>` or by a
/// legacy `[details=NAME]` paragraph, keyed by NAME.
///
/// A `<details>` table wins over a legacy table of the same name.
pub fn parse_data_tables(index: &Html) -> DataTables {
    let mut tables = legacy_tables(index);
    tables.extend(details_tables(index));
    tables
}

/// `<p>[details=NAME]</p>` followed, anywhere later, by a table.
fn legacy_tables(index: &Html) -> DataTables {
    let mut tables = DataTables::new();
    let mut pending: Vec<String> = Vec::new();

    for node in index.root_element().descendants() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        match el.value().name() {
            "p" => {
                let text = section::element_text(el);
                if let Some(caps) = LEGACY_DETAILS.captures(&text) {
                    pending.push(caps[1].to_owned());
                }
            }
            "table" if !pending.is_empty() => {
                let rows = section::parse_table(el);
                for name in pending.drain(..) {
                    tables.insert(name, rows.clone());
                }
            }
            _ => {}
        }
    }

    tables
}

fn details_tables(index: &Html) -> DataTables {
    let mut tables = DataTables::new();

    for details in index
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "details")
    {
        let first = |name: &str| {
            details
                .descendants()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == name)
        };
        let (Some(summary), Some(table)) = (first("summary"), first("table")) else {
            continue;
        };
        let name = section::element_text(summary).trim().to_owned();
        tables.insert(name, section::parse_table(table));
    }

    tables
}
