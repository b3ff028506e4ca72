//! Shopping list aggregation.
//!
//! Every ingredient line of every recipe in a user's cart is folded into one
//! entry per `(name, measurement unit)` pair, amounts summed as `f64`. Entries
//! come out ordered by name, then unit, whatever order the lines arrived in.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Write},
    ops::Deref,
};

use tracing::{debug, trace_span};

use crate::store::{RecipeStore, StoreError};

/// One ingredient line of a recipe sitting in a shopping cart.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: f64,
}

impl CartLine {
    pub fn new(name: impl Into<String>, measurement_unit: impl Into<String>, amount: f64) -> Self {
        Self {
            name: name.into(),
            measurement_unit: measurement_unit.into(),
            amount,
        }
    }
}

/// Two ingredients with the same name but different units never merge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IngredientKey {
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShoppingListEntry {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: f64,
}

impl Display for ShoppingListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - {}",
            self.name,
            self.measurement_unit,
            format_amount(self.total_amount)
        )
    }
}

#[derive(Clone, Default, PartialEq)]
pub struct ShoppingList {
    inner: BTreeMap<IngredientKey, f64>,
}

impl ShoppingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_line(&mut self, line: CartLine) {
        let key = IngredientKey {
            name: line.name,
            measurement_unit: line.measurement_unit,
        };

        self.inner
            .entry(key)
            .and_modify(|total| *total += line.amount)
            .or_insert(line.amount);
    }

    pub fn add_lines(&mut self, lines: impl IntoIterator<Item = CartLine>) {
        lines.into_iter().for_each(|line| self.add_line(line));
    }

    pub fn entries(&self) -> impl Iterator<Item = ShoppingListEntry> + '_ {
        self.inner.iter().map(|(key, total)| ShoppingListEntry {
            name: key.name.clone(),
            measurement_unit: key.measurement_unit.clone(),
            total_amount: *total,
        })
    }

    /// Plain-text report, one `"<name> (<unit>) - <amount>"` line per entry.
    pub fn render(&self) -> String {
        self.entries().fold(String::new(), |mut text, entry| {
            // writing into a String cannot fail
            let _ = writeln!(text, "{entry}");
            text
        })
    }
}

impl Deref for ShoppingList {
    type Target = BTreeMap<IngredientKey, f64>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl fmt::Debug for ShoppingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

pub fn aggregate(lines: impl IntoIterator<Item = CartLine>) -> ShoppingList {
    let mut list = ShoppingList::new();
    list.add_lines(lines);
    list
}

/// Reads the user's cart through the store and aggregates it. Never writes.
pub fn shopping_list_for(store: &dyn RecipeStore, user_id: i32) -> Result<ShoppingList, StoreError> {
    let span = trace_span!("aggregating shopping list", user_id);
    let _guard = span.enter();

    let lines = store.cart_lines(user_id)?;
    let line_count = lines.len();
    let list = aggregate(lines);

    debug!(line_count, entries = list.len(), "Shopping list aggregated");

    Ok(list)
}

/// Snapped to nine decimals, then printed in the shortest form that reads back
/// as that value, with at least one decimal (`8.0`, `0.125`, `0.3` for `0.1 + 0.2`).
fn format_amount(amount: f64) -> String {
    let snapped = (amount * 1e9).round() / 1e9;

    let mut text = snapped.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}
