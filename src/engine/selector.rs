use itertools::Itertools;

/// Tracks the sorted list of driver codes on offer and which one is selected.
#[derive(Clone, Debug, Default)]
pub struct DriverSelector {
    codes: Vec<String>,
    selected: Option<String>,
}

impl DriverSelector {
    /// Replaces the listed codes with `incoming`. Returns `false` when the list
    /// did not change. The selection survives if its code is still listed,
    /// otherwise the first code is selected.
    pub fn refresh<'a>(&mut self, incoming: impl IntoIterator<Item = &'a str>) -> bool {
        let incoming: Vec<String> = incoming
            .into_iter()
            .sorted_unstable()
            .dedup()
            .map(str::to_string)
            .collect();
        if incoming == self.codes {
            return false;
        }

        let keep = self
            .selected
            .as_ref()
            .is_some_and(|selected| incoming.contains(selected));
        if !keep {
            self.selected = incoming.first().cloned();
        }
        self.codes = incoming;
        true
    }

    /// Selects `code` if it is listed. Returns whether the selection changed.
    pub fn select(&mut self, code: &str) -> bool {
        if self.selected.as_deref() == Some(code) || !self.codes.iter().any(|c| c == code) {
            return false;
        }
        self.selected = Some(code.to_string());
        true
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }
}
