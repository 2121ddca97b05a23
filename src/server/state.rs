use crate::location::Session;

pub struct AppState {
    pub session: Session,
}
