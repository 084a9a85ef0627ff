use libpagecast::PagecastService;

/// Shared application state handed to every handler
pub struct AppState {
    pub service: PagecastService,
}

impl AppState {
    pub fn new(service: PagecastService) -> Self {
        Self { service }
    }
}
