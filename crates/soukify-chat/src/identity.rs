use std::sync::RwLock;

/// Supplies the signed-in user id that scopes every sync operation.
pub trait Identity: Send + Sync + 'static {
    fn current_user_id(&self) -> Option<String>;
}

/// Application-scoped session state. Set on login, cleared on logout.
#[derive(Default)]
pub struct Session {
    user_id: RwLock<Option<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let session = Self::new();
        session.sign_in(user_id);
        session
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let mut guard = self.user_id.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        let mut guard = self.user_id.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }
}

impl Identity for Session {
    fn current_user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
