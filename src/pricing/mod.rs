//! Per-million-token USD pricing tables (cost model).

use crate::models::ProviderKind;

struct Tier {
    input_per_million: f64,
    output_per_million: f64,
}

const OPENAI_DEFAULT: Tier = Tier {
    input_per_million: 1.00,
    output_per_million: 2.00,
};

const ANTHROPIC_DEFAULT: Tier = Tier {
    input_per_million: 3.00,
    output_per_million: 15.00,
};

const OTHER_DEFAULT: Tier = Tier {
    input_per_million: 1.00,
    output_per_million: 2.00,
};

fn openai_tier(model: &str) -> Tier {
    if model.starts_with("gpt-4o") {
        Tier { input_per_million: 2.50, output_per_million: 10.00 }
    } else if model.starts_with("gpt-4") {
        Tier { input_per_million: 30.00, output_per_million: 60.00 }
    } else if model.starts_with("gpt-3.5") {
        Tier { input_per_million: 0.50, output_per_million: 1.50 }
    } else if model.starts_with("o1") {
        Tier { input_per_million: 15.00, output_per_million: 60.00 }
    } else {
        OPENAI_DEFAULT
    }
}

fn anthropic_tier(model: &str) -> Tier {
    if model.contains("opus") {
        Tier { input_per_million: 15.00, output_per_million: 75.00 }
    } else if model.contains("sonnet") {
        Tier { input_per_million: 3.00, output_per_million: 15.00 }
    } else if model.contains("haiku") {
        Tier { input_per_million: 0.25, output_per_million: 1.25 }
    } else {
        ANTHROPIC_DEFAULT
    }
}

/// Cost in USD for a completed call, given the un-prefixed model name and
/// token usage. `provider` is `None` for providers outside the closed set
/// (kept only so the table degrades gracefully rather than panicking).
pub fn cost_usd(
    provider: Option<ProviderKind>,
    model: &str,
    prompt_tokens: i64,
    completion_tokens: i64,
) -> f64 {
    let tier = match provider {
        Some(ProviderKind::Openai) => openai_tier(model),
        Some(ProviderKind::Anthropic) => anthropic_tier(model),
        None => OTHER_DEFAULT,
    };
    (prompt_tokens as f64 * tier.input_per_million + completion_tokens as f64 * tier.output_per_million)
        / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn openai_happy_path_cost() {
        let cost = cost_usd(Some(ProviderKind::Openai), "gpt-4o", 10, 20);
        assert!((cost - 2.25e-4).abs() < 1e-9);
    }

    #[rstest]
    #[case("gpt-4o", 2.50, 10.00)]
    #[case("gpt-4-turbo", 30.00, 60.00)]
    #[case("gpt-3.5-turbo", 0.50, 1.50)]
    #[case("o1-preview", 15.00, 60.00)]
    fn openai_tier_rates_match_model_family(
        #[case] model: &str,
        #[case] input_per_million: f64,
        #[case] output_per_million: f64,
    ) {
        let tier = openai_tier(model);
        assert!((tier.input_per_million - input_per_million).abs() < 1e-9);
        assert!((tier.output_per_million - output_per_million).abs() < 1e-9);
    }

    #[test]
    fn anthropic_haiku_is_cheaper_than_opus() {
        let haiku = cost_usd(Some(ProviderKind::Anthropic), "claude-3-haiku-20240307", 1000, 1000);
        let opus = cost_usd(Some(ProviderKind::Anthropic), "claude-3-opus-20240229", 1000, 1000);
        assert!(haiku < opus);
    }

    #[test]
    fn unknown_openai_model_uses_default_tier() {
        let cost = cost_usd(Some(ProviderKind::Openai), "text-davinci-003", 1_000_000, 0);
        assert!((cost - 1.00).abs() < 1e-9);
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        assert_eq!(cost_usd(Some(ProviderKind::Openai), "gpt-4o", 0, 0), 0.0);
    }
}
