use serde::Serialize;

#[derive(Serialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: &'static str,
    pub message: String,
    pub color: &'static str,
}

/// Canned insight cards for the farmer dashboard, templated from the
/// farmer's average listing price. Nothing is learned here.
pub fn generate_insights(product_count: i64, avg_price: Option<f64>) -> Vec<Insight> {
    if product_count == 0 {
        return Vec::new();
    }

    let avg_price = avg_price.unwrap_or(0.0);

    vec![
        Insight {
            kind: "market_trend",
            title: "Market Trend",
            message: format!(
                "Your average price of KES {:.2} is competitive in the market.",
                avg_price
            ),
            color: "blue",
        },
        Insight {
            kind: "price_suggestion",
            title: "Price Suggestion",
            message: "Consider seasonal pricing adjustments for better sales.".to_string(),
            color: "green",
        },
        Insight {
            kind: "inventory_tip",
            title: "Inventory Tip",
            message: "Restock popular items to meet demand.".to_string(),
            color: "purple",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_products_means_no_insights() {
        assert!(generate_insights(0, None).is_empty());
    }

    #[test]
    fn insights_include_formatted_average_price() {
        let insights = generate_insights(3, Some(42.5));
        assert_eq!(insights.len(), 3);
        assert!(insights[0].message.contains("KES 42.50"));
    }
}
