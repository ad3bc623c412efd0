/// One-shot outreach template injected into an empty compose field
use crate::model::{ConversationId, Role};

fn greeting(name: Option<&str>) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => format!("Hi, {}! 👋", n),
        None => "Hi! 👋".to_string(),
    }
}

/// Outreach template for the signed-in role, addressed to the counterpart.
pub fn outreach_template(role: Role, counterpart_name: Option<&str>) -> String {
    let hello = greeting(counterpart_name);
    match role {
        Role::Requester => format!(
            "{}\n\n\
             We found your profile on BlogOpen and would like to work with you.\n\n\
             About the campaign:\n\
             - product/service: ________\n\
             - format: ________\n\
             - dates: ________\n\
             - budget: ________\n\n\
             Let us know if you are interested!",
            hello
        ),
        Role::Responder => format!(
            "{}\n\n\
             I'm writing from BlogOpen and would like to offer a collaboration.\n\n\
             In short:\n\
             - product/service: ________\n\
             - format: ________\n\
             - dates: ________\n\
             - budget: ________\n\n\
             If you're interested, please tell me:\n\
             1) your rates/conditions\n\
             2) available dates\n\
             3) where to send the brief\n\n\
             Thanks!",
            hello
        ),
    }
}

#[derive(Debug, Clone)]
pub struct DraftPrefill {
    role: Role,
    armed_for: Option<ConversationId>,
    consumed: bool,
}

impl DraftPrefill {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            armed_for: None,
            consumed: false,
        }
    }

    /// Run on conversation activation. Returns true if `draft` was filled.
    /// The flag re-arms only when the active id changes. It stays armed while
    /// the counterpart name is unknown, and is consumed on the first call that
    /// has a name, whether or not text was injected.
    pub fn on_activate(
        &mut self,
        conversation: ConversationId,
        counterpart_name: Option<&str>,
        draft: &mut String,
    ) -> bool {
        if self.armed_for != Some(conversation) {
            self.armed_for = Some(conversation);
            self.consumed = false;
        }
        if self.consumed || counterpart_name.is_none() {
            return false;
        }
        self.consumed = true;

        if !draft.trim().is_empty() {
            return false;
        }
        *draft = outreach_template(self.role, counterpart_name);
        true
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefills_once_per_activation() {
        let mut prefill = DraftPrefill::new(Role::Responder);
        let mut draft = String::new();

        assert!(prefill.on_activate(1, Some("Acme"), &mut draft));
        assert!(draft.starts_with("Hi, Acme!"));

        // user clears the field, re-render without switching
        draft.clear();
        assert!(!prefill.on_activate(1, Some("Acme"), &mut draft));
        assert!(draft.is_empty());
    }

    #[test]
    fn test_switch_and_back_rearms() {
        let mut prefill = DraftPrefill::new(Role::Requester);
        let mut draft = String::new();

        assert!(prefill.on_activate(1, Some("Ann"), &mut draft));
        draft.clear();
        assert!(prefill.on_activate(2, Some("Bob"), &mut draft));
        assert!(draft.contains("Bob"));
        draft.clear();
        assert!(prefill.on_activate(1, Some("Ann"), &mut draft));
        assert!(draft.contains("Ann"));
    }

    #[test]
    fn test_existing_draft_is_kept() {
        let mut prefill = DraftPrefill::new(Role::Responder);
        let mut draft = "restored draft".to_string();
        assert!(!prefill.on_activate(3, Some("Acme"), &mut draft));
        assert_eq!(draft, "restored draft");
        assert!(prefill.is_consumed());
    }

    #[test]
    fn test_waits_for_counterpart_name() {
        let mut prefill = DraftPrefill::new(Role::Responder);
        let mut draft = String::new();

        // conversation not in the directory yet
        assert!(!prefill.on_activate(5, None, &mut draft));
        assert!(draft.is_empty());
        assert!(!prefill.is_consumed());

        assert!(prefill.on_activate(5, Some("Kate"), &mut draft));
        assert!(draft.starts_with("Hi, Kate!"));
        assert!(prefill.is_consumed());
    }

    #[test]
    fn test_unknown_name_renders_plain_greeting() {
        let text = outreach_template(Role::Responder, None);
        assert!(text.starts_with("Hi! 👋"));
        let text = outreach_template(Role::Requester, Some("  "));
        assert!(text.starts_with("Hi! 👋"));
    }
}
