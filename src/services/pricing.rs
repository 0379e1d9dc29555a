use rand::Rng;

/// Flat 10% markup over the farmer's asking price. This is the whole
/// "AI" behind the suggested price.
const SUGGESTED_PRICE_MARKUP: f64 = 1.10;

pub fn suggested_price(price: f64) -> f64 {
    price * SUGGESTED_PRICE_MARKUP
}

pub struct Recommendation {
    pub score: f64,
    pub message: String,
}

pub fn recommend(product_name: &str, county: &str) -> Recommendation {
    let score = rand::thread_rng().gen_range(0.7..1.0);
    Recommendation {
        score,
        message: format!("Great price for {} in {}!", product_name, county),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_price_adds_ten_percent() {
        assert!((suggested_price(100.0) - 110.0).abs() < 1e-9);
        assert!((suggested_price(0.0)).abs() < 1e-9);
    }

    #[test]
    fn recommendation_score_stays_in_range() {
        for _ in 0..100 {
            let rec = recommend("Tomatoes", "Kiambu");
            assert!(rec.score >= 0.7 && rec.score < 1.0);
        }
    }

    #[test]
    fn recommendation_message_names_product_and_county() {
        let rec = recommend("Sukuma wiki", "Nakuru");
        assert!(rec.message.contains("Sukuma wiki"));
        assert!(rec.message.contains("Nakuru"));
    }
}
