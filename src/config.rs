pub struct Config {
    pub symbols_path: String,
    pub dates_path: String,
    pub output_dir: String,
    pub debug_mode: bool,
    pub debug_symbol_limit: usize,
}

impl Config {
    pub fn new() -> Self {
        Self {
            symbols_path: "stock_symbols.csv".to_string(),
            dates_path: "target_dates.csv".to_string(),
            output_dir: ".".to_string(),
            debug_mode: false,
            debug_symbol_limit: 10,
        }
    }

    pub fn with_symbols_path(mut self, path: &str) -> Self {
        self.symbols_path = path.to_string();
        self
    }

    pub fn with_dates_path(mut self, path: &str) -> Self {
        self.dates_path = path.to_string();
        self
    }

    pub fn with_output_dir(mut self, dir: &str) -> Self {
        self.output_dir = dir.to_string();
        self
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn with_debug_symbol_limit(mut self, limit: usize) -> Self {
        self.debug_symbol_limit = limit;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
