// Filtri opzionali passati al backend ad ogni richiesta
use chrono::NaiveDate;

/// Date format used by the date pickers of the web front-end.
pub const DATE_FORMAT: &str = "%m/%d/%Y";

/// Opaque query parameters forwarded with every request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilters {
    pub symbols: Vec<String>,
    pub stats: Vec<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.query_pairs().is_empty()
    }

    /// Query string pairs, skipping everything that is unset.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if !self.symbols.is_empty() {
            pairs.push(("symbols", self.symbols.join(",")));
        }
        if !self.stats.is_empty() {
            pairs.push(("stats", self.stats.join(",")));
        }
        if let Some(start) = self.start {
            pairs.push(("start", start.format(DATE_FORMAT).to_string()));
        }
        if let Some(end) = self.end {
            pairs.push(("end", end.format(DATE_FORMAT).to_string()));
        }
        pairs
    }

    /// Pulls `start` back to the day before `end` when the range is inverted.
    /// Returns a note for the user when something was changed.
    pub fn fix_range(&mut self) -> Option<String> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => {
                // no day before NaiveDate::MIN, leave the range alone
                let fixed = end.pred_opt()?;
                self.start = Some(fixed);
                Some(format!("Resetting start date to {}", fixed.format(DATE_FORMAT)))
            }
            _ => None,
        }
    }
}

/// Splits a comma or whitespace separated list, dropping empty entries.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Accepts `MM/DD/YYYY` (date picker) or ISO `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| format!("invalid date '{}', expected MM/DD/YYYY", raw))
}
