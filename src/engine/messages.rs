//! User-facing feedback strings.
//!
//! These are the only texts a client ever sees for a withdrawal; internal
//! error detail stays in the logs.

use crate::domain::CardType;
use rust_decimal::Decimal;

pub const BASE: &str = "An error occurred, please try again";
pub const UNKNOWN: &str = "An unknown error occurred";
pub const REFRESH: &str = "An error occurred. Please try refreshing.";
pub const NOT_AUTHORIZED: &str = "Please login to withdraw!";
pub const ACCOUNT_SUSPENDED: &str =
    "You are currently banned from withdrawing, please contact staff if you believe this is a mistake.";
pub const EMAIL_NOT_VERIFIED: &str =
    "You must verify your E-mail address before requesting a withdrawal!";
pub const BALANCE_NOT_ENOUGH: &str = "You don't have enough balance!";
pub const AMOUNT_REQUIRED: &str = "Please select an amount!";
pub const OUT_OF_STOCK: &str = "This card is currently out of stock. Please choose another.";
pub const ATTEMPT_IN_PROGRESS: &str = "Your withdrawal is already being processed.";

pub const PENDING_REVIEW: &str = "Success!<br>Since you are not verified, a staff member has been notified and will review your withdrawal shortly! Check your Profile page to view your redemption code after the withdrawal has been approved.<br><br>Have an opinion on our site? Share it by <a href=\"https://trustpilot.com/evaluate/freecash.com\" target=\"_blank\">writing a Trustpilot review</a>!";
pub const PENDING_ISSUE_DELAYED: &str = "Success!<br>Your card could not be delivered instantly, so a staff member will complete your withdrawal shortly. Check your Profile page to view your redemption code after the withdrawal has been approved.";
pub const PENDING_RESTOCK: &str = "Success!<br>This card is currently out of stock. A staff member will approve your withdrawal when it is restocked.";

/// Coins per US dollar used for the displayed equivalent.
const COINS_PER_DOLLAR: i64 = 1000;

/// Dollar equivalent of a coin amount, always with two decimals.
pub fn dollar_equivalent(coins: i64) -> String {
    let mut dollars = Decimal::from(coins) / Decimal::from(COINS_PER_DOLLAR);
    dollars.rescale(2);
    dollars.to_string()
}

/// Explanation shown when lifetime earnings are below the threshold.
pub fn min_earned(threshold: i64) -> String {
    format!(
        "You must earn at least {} coins (${}) through the offer walls before withdrawing.<br>This is to prevent abuse of the site bonuses. Please contact staff with any questions.",
        threshold,
        dollar_equivalent(threshold)
    )
}

pub fn pending_notification(card_type: CardType, coins: i64) -> String {
    format!(
        "Your {} Gift Card withdrawal worth {} coins is pending.",
        card_type, coins
    )
}

pub fn success_notification(card_type: CardType, card_code: &str, coins: i64) -> String {
    format!(
        "Your {} code: {}, Gift Card withdrawal worth {} coins is successful.",
        card_type, card_code, coins
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dollar_equivalent_two_decimals() {
        assert_eq!(dollar_equivalent(200), "0.20");
        assert_eq!(dollar_equivalent(1500), "1.50");
        assert_eq!(dollar_equivalent(12340), "12.34");
        assert_eq!(dollar_equivalent(0), "0.00");
    }

    #[test]
    fn test_min_earned_derives_from_threshold() {
        let text = min_earned(200);
        assert!(text.starts_with("You must earn at least 200 coins ($0.20)"));

        let text = min_earned(5000);
        assert!(text.contains("5000 coins ($5.00)"));
    }

    #[test]
    fn test_notification_texts() {
        assert_eq!(
            pending_notification(CardType::Steam, 100),
            "Your Steam Gift Card withdrawal worth 100 coins is pending."
        );
        assert_eq!(
            success_notification(CardType::Visa, "XYZ", 100),
            "Your Visa code: XYZ, Gift Card withdrawal worth 100 coins is successful."
        );
    }
}
