use std::path::Path;

use genpdf::{elements, style::Style, Alignment, Element};
use indexmap::IndexMap;

use super::repo::CartIngredientRow;

const TITLE: &str = "Shopping list";

/// One aggregated line of the shopping list.
#[derive(Debug, PartialEq, Eq)]
pub struct ShoppingItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// Group cart lines by ingredient identity (name + measurement unit)
/// and sum the amounts. The identity is the user-visible one, so the
/// same ingredient coming from different recipes collapses into a
/// single line. Output keeps first-seen order.
pub fn aggregate(rows: impl IntoIterator<Item = CartIngredientRow>) -> Vec<ShoppingItem> {
    let mut sums: IndexMap<(String, String), i64> = IndexMap::new();
    for row in rows {
        *sums
            .entry((row.name, row.measurement_unit))
            .or_insert(0) += i64::from(row.amount);
    }
    sums.into_iter()
        .map(|((name, measurement_unit), amount)| ShoppingItem {
            name,
            measurement_unit,
            amount,
        })
        .collect()
}

pub fn format_line(item: &ShoppingItem) -> String {
    format!(
        "{} ({}) - {}",
        item.name, item.measurement_unit, item.amount
    )
}

/// Render the aggregated list to a PDF document. The font family is
/// loaded from disk because the standard PDF fonts cannot display
/// non-Latin ingredient names; a missing font directory fails the
/// whole request.
pub fn render_pdf(
    items: &[ShoppingItem],
    font_dir: &Path,
    font_family: &str,
) -> anyhow::Result<Vec<u8>> {
    let family = genpdf::fonts::from_files(font_dir, font_family, None).map_err(|e| {
        anyhow::anyhow!(
            "load font family {font_family} from {}: {e}",
            font_dir.display()
        )
    })?;

    let mut doc = genpdf::Document::new(family);
    doc.set_title(TITLE);
    let mut decorator = genpdf::SimplePageDecorator::new();
    decorator.set_margins(10);
    doc.set_page_decorator(decorator);

    doc.push(
        elements::Paragraph::new(TITLE)
            .aligned(Alignment::Center)
            .styled(Style::new().with_font_size(20)),
    );
    doc.push(elements::Paragraph::new(""));

    let mut list = elements::UnorderedList::new();
    for item in items {
        list.push(elements::Paragraph::new(format_line(item)));
    }
    doc.push(list);

    let mut buffer = Vec::new();
    doc.render(&mut buffer)
        .map_err(|e| anyhow::anyhow!("render shopping list pdf: {e}"))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, unit: &str, amount: i32) -> CartIngredientRow {
        CartIngredientRow {
            name: name.into(),
            measurement_unit: unit.into(),
            amount,
        }
    }

    #[test]
    fn sums_amounts_of_the_same_ingredient() {
        let items = aggregate(vec![row("flour", "g", 200), row("flour", "g", 300)]);
        assert_eq!(items.len(), 1);
        assert_eq!(format_line(&items[0]), "flour (g) - 500");
    }

    #[test]
    fn different_units_stay_separate() {
        let items = aggregate(vec![row("milk", "ml", 100), row("milk", "tbsp", 2)]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].amount, 100);
        assert_eq!(items[1].amount, 2);
    }

    #[test]
    fn keeps_first_seen_order() {
        let items = aggregate(vec![
            row("salt", "g", 5),
            row("flour", "g", 200),
            row("salt", "g", 10),
            row("eggs", "pcs", 2),
        ]);
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["salt", "flour", "eggs"]);
        assert_eq!(items[0].amount, 15);
    }

    #[test]
    fn empty_cart_aggregates_to_nothing() {
        assert!(aggregate(Vec::new()).is_empty());
    }

    #[test]
    fn render_fails_without_a_font_directory() {
        let items = aggregate(vec![row("flour", "g", 200)]);
        let err = render_pdf(&items, Path::new("/definitely/not/here"), "NoFont").unwrap_err();
        assert!(err.to_string().contains("NoFont"));
    }
}
