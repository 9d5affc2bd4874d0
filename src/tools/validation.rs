//! 提醒参数校验：频率归一化、日期格式与范围、频率与日期二选一

use chrono::NaiveDate;

/// 允许的频率取值
pub const ALLOWED_FREQUENCIES: &[&str] = &["daily", "fortnightly", "monthly", "weekly"];

/// 频率归一化：常见同义词映射到标准值；无法识别时原样返回（由 validate_frequency 报错）
pub fn normalize_frequency(frequency: &str) -> String {
    let normalized = frequency.trim().to_lowercase();
    match normalized.as_str() {
        "daily" | "day" | "everyday" | "every day" => "daily".into(),
        "weekly" | "week" | "every week" => "weekly".into(),
        "fortnightly" | "fortnight" | "every fortnight" | "every two weeks" | "bi-weekly"
        | "biweekly" => "fortnightly".into(),
        "monthly" | "month" | "every month" => "monthly".into(),
        _ => frequency.to_string(),
    }
}

pub fn validate_frequency(frequency: &str) -> Result<(), String> {
    if ALLOWED_FREQUENCIES.contains(&frequency.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(format!(
            "Invalid frequency '{}'. Allowed values: {}",
            frequency,
            ALLOWED_FREQUENCIES.join(", ")
        ))
    }
}

/// 日期必须是 YYYY-MM-DD 且不早于 today
pub fn validate_date(date: &str, today: NaiveDate) -> Result<NaiveDate, String> {
    let well_formed = date.len() == 10
        && date
            .char_indices()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    if !well_formed {
        return Err(format!("Invalid date format '{}'. Use YYYY-MM-DD format", date));
    }
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}'. Please provide a valid date", date))?;
    if parsed < today {
        return Err(format!(
            "Date '{}' is in the past. Please choose a future date",
            date
        ));
    }
    Ok(parsed)
}

/// 完整校验：各自合法，且恰好给出频率与日期之一
pub fn validate_reminder_data(
    frequency: Option<&str>,
    date: Option<&str>,
    today: NaiveDate,
) -> Result<(), String> {
    if let Some(f) = frequency {
        validate_frequency(f)?;
    }
    if let Some(d) = date {
        validate_date(d, today)?;
    }
    match (frequency, date) {
        (None, None) => Err("Must specify either frequency or date for reminder".into()),
        (Some(_), Some(_)) => {
            Err("Cannot specify both frequency and date. Choose one option only".into())
        }
        _ => Ok(()),
    }
}

/// 今天（本地日期）
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
