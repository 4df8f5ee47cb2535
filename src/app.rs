//! Application state for the interactive search.
//!
//! `App` is a plain state machine. Keystrokes come in through its methods and
//! anything that needs the network comes back out as an [`Action`] for the
//! event loop to run.

use crate::error::FlowError;
use crate::models::{Catalog, MatchCandidate, ResolvedSelection, StockChart};
use crate::search::SearchService;

/// What Enter does with the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Search-as-you-type over the catalog
    Search,
    /// Plain-English prompt sent to the intent resolver
    Ask,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Search => "Search",
            Mode::Ask => "Ask",
        }
    }
}

/// Work the event loop has to do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    /// Fetch history for a picked suggestion
    FetchHistory(ResolvedSelection),
    /// Run a prompt through the intent flow
    Ask(String),
    /// Drop the cached catalog and load it again
    ReloadCatalog,
}

/// Application state.
pub struct App {
    search: SearchService,
    /// Records in the loaded catalog
    pub catalog_len: usize,
    pub mode: Mode,
    /// Current input line
    pub input: String,
    /// Ranked suggestions for the input
    pub results: Vec<MatchCandidate>,
    /// Suggestion panel visible
    pub show_results: bool,
    /// Highlighted suggestion
    pub selected: usize,
    /// Last confirmed company
    pub selection: Option<ResolvedSelection>,
    /// Last fetched chart
    pub chart: Option<StockChart>,
    /// Status line while a request is in flight
    pub pending: Option<String>,
    /// Error message to display
    pub error: Option<String>,
    /// Show help overlay
    pub show_help: bool,
    /// Is the app running
    pub running: bool,
    clear_on_focus: bool,
    /// Input still shows a confirmed selection
    showing_selection: bool,
}

impl App {
    pub fn new(search: SearchService, catalog_len: usize, clear_on_focus: bool) -> Self {
        Self {
            search,
            catalog_len,
            mode: Mode::Search,
            input: String::new(),
            results: Vec::new(),
            show_results: false,
            selected: 0,
            selection: None,
            chart: None,
            pending: None,
            error: None,
            show_help: false,
            running: true,
            clear_on_focus,
            showing_selection: false,
        }
    }

    pub fn limit(&self) -> usize {
        self.search.limit()
    }

    /// Re-run the search for the current input.
    pub fn on_input(&mut self) {
        self.selected = 0;
        if self.mode != Mode::Search || self.input.trim().is_empty() {
            self.results.clear();
            self.show_results = false;
            return;
        }

        self.results = self.search.search(&self.input);
        self.show_results = true;
    }

    pub fn push_char(&mut self, c: char) {
        self.start_editing();
        self.input.push(c);
        self.on_input();
    }

    pub fn backspace(&mut self) {
        self.start_editing();
        self.input.pop();
        self.on_input();
    }

    pub fn clear_input(&mut self) {
        self.input.clear();
        self.showing_selection = false;
        self.on_input();
    }

    fn start_editing(&mut self) {
        if self.showing_selection && self.clear_on_focus {
            self.input.clear();
        }
        self.showing_selection = false;
    }

    /// Move selection up.
    pub fn select_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    /// Move selection down.
    pub fn select_down(&mut self) {
        if self.selected < self.results.len().saturating_sub(1) {
            self.selected += 1;
        }
    }

    pub fn highlighted(&self) -> Option<&MatchCandidate> {
        if self.show_results {
            self.results.get(self.selected)
        } else {
            None
        }
    }

    /// Enter: pick the highlighted suggestion, or submit the prompt.
    pub fn submit(&mut self) -> Action {
        match self.mode {
            Mode::Search => self.confirm(),
            Mode::Ask => {
                let prompt = self.input.trim();
                if prompt.is_empty() {
                    return Action::None;
                }
                let prompt = prompt.to_string();
                self.pending = Some(format!("Asking: {}", prompt));
                Action::Ask(prompt)
            }
        }
    }

    /// Take the highlighted suggestion as the selection.
    pub fn confirm(&mut self) -> Action {
        let Some(candidate) = self.highlighted() else {
            return Action::None;
        };

        let selection = ResolvedSelection::from(candidate.record.clone());
        self.input = selection.to_string();
        self.showing_selection = true;
        self.results.clear();
        self.show_results = false;
        self.selected = 0;
        self.selection = Some(selection.clone());
        self.pending = Some(format!("Loading {}", selection.symbol));

        Action::FetchHistory(selection)
    }

    /// Record the outcome of a fetch started by [`Action`].
    pub fn finish(&mut self, result: Result<StockChart, FlowError>) {
        self.pending = None;
        match result {
            Ok(chart) => {
                self.selection = Some(ResolvedSelection {
                    symbol: chart.symbol.clone(),
                    name: chart.company_name.clone(),
                });
                self.chart = Some(chart);
                self.error = None;
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn fail(&mut self, error: FlowError) {
        self.pending = None;
        self.error = Some(error.envelope().error);
    }

    /// Ctrl-R: ask the event loop for a fresh catalog.
    pub fn request_reload(&mut self) -> Action {
        self.pending = Some("Reloading ticker catalog".to_string());
        Action::ReloadCatalog
    }

    /// Swap in a reloaded catalog and re-run the current query against it.
    pub fn reload(&mut self, catalog: &Catalog) {
        self.search.rebuild(catalog);
        self.catalog_len = catalog.len();
        self.pending = None;
        self.on_input();
    }

    /// Tab: switch between search and ask.
    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            Mode::Search => Mode::Ask,
            Mode::Ask => Mode::Search,
        };
        self.on_input();
    }

    /// Toggle help display.
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    /// Quit the application.
    pub fn quit(&mut self) {
        self.running = false;
    }

    pub fn should_quit(&self) -> bool {
        !self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TickerRecord;

    fn app(clear_on_focus: bool) -> App {
        let (catalog, _) = Catalog::from_records(vec![
            TickerRecord::new("AAPL", "Apple Inc."),
            TickerRecord::new("MSFT", "Microsoft Corp"),
            TickerRecord::new("NVDA", "NVIDIA Corporation"),
            TickerRecord::new("BAC", "Bank of America Corporation"),
        ]);
        let len = catalog.len();
        App::new(SearchService::init(&catalog, 0.3, 10), len, clear_on_focus)
    }

    fn type_str(app: &mut App, text: &str) {
        for c in text.chars() {
            app.push_char(c);
        }
    }

    #[test]
    fn test_typing_shows_results() {
        let mut app = app(false);
        type_str(&mut app, "nvidia");
        assert!(app.show_results);
        assert_eq!(app.results[0].record.symbol, "NVDA");
    }

    #[test]
    fn test_blank_input_hides_results() {
        let mut app = app(false);
        type_str(&mut app, "n");
        app.backspace();
        assert!(app.input.is_empty());
        assert!(!app.show_results);
        assert!(app.results.is_empty());

        type_str(&mut app, "   ");
        assert!(!app.show_results);
    }

    #[test]
    fn test_confirm_fills_input_and_hides_panel() {
        let mut app = app(false);
        type_str(&mut app, "nvidia");

        let action = app.submit();
        let expected = ResolvedSelection {
            symbol: "NVDA".to_string(),
            name: "NVIDIA Corporation".to_string(),
        };
        assert_eq!(action, Action::FetchHistory(expected.clone()));
        assert_eq!(app.input, "NVIDIA Corporation (NVDA)");
        assert!(!app.show_results);
        assert_eq!(app.selection, Some(expected));
        assert!(app.pending.is_some());
    }

    #[test]
    fn test_confirm_without_results_does_nothing() {
        let mut app = app(false);
        assert_eq!(app.submit(), Action::None);
        type_str(&mut app, "zzzzzz_not_a_company");
        assert_eq!(app.submit(), Action::None);
    }

    #[test]
    fn test_selection_moves_within_results() {
        let mut app = app(false);
        type_str(&mut app, "corporation");
        assert!(app.results.len() >= 2);

        app.select_up();
        assert_eq!(app.selected, 0);
        for _ in 0..10 {
            app.select_down();
        }
        assert_eq!(app.selected, app.results.len() - 1);

        let last = app.results[app.selected].record.symbol.clone();
        match app.confirm() {
            Action::FetchHistory(selection) => assert_eq!(selection.symbol, last),
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_clear_on_focus() {
        let mut app = app(true);
        type_str(&mut app, "apple");
        app.confirm();
        app.push_char('m');
        assert_eq!(app.input, "m");

        let mut app = self::app(false);
        type_str(&mut app, "apple");
        app.confirm();
        app.backspace();
        assert_eq!(app.input, "Apple Inc. (AAPL");
    }

    #[test]
    fn test_ask_mode_submits_prompt() {
        let mut app = app(false);
        app.toggle_mode();
        type_str(&mut app, "Microsoft last 90 days");
        assert!(!app.show_results);
        assert_eq!(app.submit(), Action::Ask("Microsoft last 90 days".to_string()));

        app.clear_input();
        assert_eq!(app.submit(), Action::None);
    }

    #[test]
    fn test_finish_records_chart_or_error() {
        let mut app = app(false);
        app.pending = Some("Loading".to_string());
        app.finish(Err(FlowError::CompanyNotFound("Acme".to_string())));
        assert!(app.pending.is_none());
        assert!(app.error.as_deref().unwrap().contains("\"Acme\""));

        app.finish(Ok(StockChart {
            symbol: "MSFT".to_string(),
            company_name: "Microsoft Corp".to_string(),
            days: 90,
            series: Vec::new(),
        }));
        assert!(app.error.is_none());
        assert_eq!(app.selection.as_ref().unwrap().symbol, "MSFT");
        assert_eq!(app.chart.as_ref().unwrap().days, 90);
    }

    #[test]
    fn test_reload_rebuilds_search() {
        let mut app = app(false);
        type_str(&mut app, "netflix");
        assert!(app.results.is_empty());

        assert_eq!(app.request_reload(), Action::ReloadCatalog);
        let (catalog, _) = Catalog::from_records(vec![TickerRecord::new("NFLX", "Netflix, Inc.")]);
        app.reload(&catalog);

        assert_eq!(app.catalog_len, 1);
        assert!(app.pending.is_none());
        assert_eq!(app.results[0].record.symbol, "NFLX");
    }

    #[test]
    fn test_quit() {
        let mut app = app(false);
        assert!(!app.should_quit());
        app.quit();
        assert!(app.should_quit());
    }
}
