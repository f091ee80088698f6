//! treevu-core: domain types and rules for the treevü expense tracker

pub mod budget;
pub mod error;
pub mod expense;
pub mod goals;
pub mod levels;
pub mod metrics;
pub mod notifications;
pub mod policy;
pub mod rewards;
pub mod social;
pub mod tax;
pub mod time;
pub mod wizard;

pub use budget::{Budget, BudgetStatus};
pub use error::{Result, TreevuError};
pub use expense::{Category, DivertedExpense, Expense, ExpenseDraft, LineItem, ReceiptType};
pub use goals::{Contribution, Goal, GoalStatus};
pub use levels::{level_for, Level, Streak, UserProgress, LEVEL_TABLE};
pub use metrics::{MetricsSnapshot, Trend, WellnessBreakdown};
pub use notifications::{Inbox, Notification, NotificationKind};
pub use policy::{CorporatePolicy, PolicyViolation};
pub use rewards::{expense_reward, reward, streak_bonus, Dice, RewardAction, RewardBreakdown};
pub use social::{Mission, MissionMetric, Tribe};
pub use tax::{TaxEstimate, TaxTable};
pub use wizard::{
    CollaboratorFailure, EntryPath, FailureKind, ReceiptCheck, SaveRequest, SavingOffer, ScanMode,
    ScannedProducts, ScannedReceipt, SplitGroup, Wizard, WizardError, WizardEvent, WizardState,
};

/// Suggest a category from a merchant or registered business name
pub mod categorizer {
    use super::Category;
    use regex::Regex;
    use std::sync::LazyLock;

    /// Keyword rules in priority order; keywords only match whole words.
    const RULES: &[(Category, &str)] = &[
        (
            Category::Food,
            r"supermercados?|hipermercados?|tottus|plaza vea|wong|metro|makro|mercados?|bodegas?|minimarkets?",
        ),
        (
            Category::Restaurants,
            r"restaurant(?:e|es)?|cevicher[ií]as?|poller[ií]as?|chifas?|caf[eé]s?|kfc|bembos",
        ),
        (Category::Health, r"farmacias?|inkafarma|mifarma|cl[ií]nicas?|boticas?|dental"),
        (Category::Transport, r"grifos?|primax|repsol|uber|cabify|taxis?"),
        (Category::Education, r"universidad(?:es)?|colegios?|institutos?|librer[ií]as?|academias?"),
        (Category::Entertainment, r"cineplanet|cinemark|netflix|spotify|teleticket"),
        (
            Category::Services,
            r"luz del sur|enel|sedapal|movistar|claro|entel|estudios?|consultor(?:es|a|[ií]a)?",
        ),
        (Category::Housing, r"inmobiliarias?|alquiler(?:es)?|sodimac|promart"),
        (Category::Shopping, r"saga|ripley|oechsle|falabella"),
    ];

    static MATCHERS: LazyLock<Vec<(Category, Regex)>> = LazyLock::new(|| {
        RULES
            .iter()
            .map(|(category, words)| {
                let re = Regex::new(&format!(r"\b(?:{words})\b")).expect("valid category rule");
                (*category, re)
            })
            .collect()
    });

    /// Categorize a merchant name using keyword rules.
    ///
    /// Returns `None` when nothing matches so callers can keep the user's choice.
    pub fn suggest_category(merchant: &str) -> Option<Category> {
        let name = merchant.to_lowercase();
        MATCHERS
            .iter()
            .find(|(_, re)| re.is_match(&name))
            .map(|(category, _)| *category)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_suggest_groceries() {
            assert_eq!(suggest_category("SUPERMERCADOS PERUANOS S.A."), Some(Category::Food));
            assert_eq!(suggest_category("Hipermercados Tottus"), Some(Category::Food));
        }

        #[test]
        fn test_suggest_health() {
            assert_eq!(suggest_category("Inkafarma Miraflores"), Some(Category::Health));
        }

        #[test]
        fn test_suggest_restaurant() {
            assert_eq!(suggest_category("Cevichería El Muelle"), Some(Category::Restaurants));
        }

        #[test]
        fn test_suggest_services() {
            assert_eq!(suggest_category("Luz del Sur S.A.A."), Some(Category::Services));
        }

        #[test]
        fn test_keywords_match_whole_words() {
            assert_eq!(suggest_category("Metro Chorrillos"), Some(Category::Food));
            assert_eq!(suggest_category("Tarjeta Metropolitano"), None);
            assert_eq!(suggest_category("Uber Trip"), Some(Category::Transport));
            assert_eq!(suggest_category("Tubería Suberos SAC"), None);
            assert_eq!(suggest_category("Café Tostado"), Some(Category::Restaurants));
        }

        #[test]
        fn test_unknown_merchant() {
            assert_eq!(suggest_category("Inversiones XYZ"), None);
        }
    }
}

pub use categorizer::suggest_category;
