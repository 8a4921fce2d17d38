use std::borrow::Cow;
use std::fmt;

use fluent_bundle::{FluentBundle, FluentResource};
use tracing::warn;
use unic_langid::LanguageIdentifier;

use crate::locale::{ResourceSource, LOCALE_PREFIX};
use crate::settings::DEFAULT_LANGUAGE;

/// English base messages every pack is layered over.
pub const BASE_RESOURCE: &str = "locale.ftl";

/// Fallback when the resource set does not even ship the base file.
const BUILTIN_BASE: &str = include_str!("../i18n/locale.ftl");

fn parse_resource(name: &str, ftl: String) -> Option<FluentResource> {
    match FluentResource::try_new(ftl) {
        Ok(res) => Some(res),
        Err((_, errors)) => {
            warn!("Failed to parse {}: {:?}. Skipping.", name, errors);
            None
        }
    }
}

fn language_id(code: &str) -> LanguageIdentifier {
    code.parse()
        .or_else(|_| DEFAULT_LANGUAGE.parse())
        .unwrap_or_default()
}

/// Message bundle for one language code.
pub struct Localizer {
    code: String,
    bundle: FluentBundle<FluentResource>,
}

impl fmt::Debug for Localizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Localizer").field("code", &self.code).finish()
    }
}

impl Localizer {
    pub fn load(source: &dyn ResourceSource, code: &str) -> Self {
        let mut bundle = FluentBundle::new(vec![language_id(code)]);
        // Notification text is shown verbatim, no bidi isolation marks
        bundle.set_use_isolating(false);

        let base = source
            .read_resource(BASE_RESOURCE)
            .unwrap_or_else(|| BUILTIN_BASE.to_string());
        let base = parse_resource(BASE_RESOURCE, base)
            .or_else(|| parse_resource("built-in base", BUILTIN_BASE.to_string()));
        if let Some(res) = base {
            if let Err(e) = bundle.add_resource(res) {
                warn!("Failed to add base messages: {:?}", e);
            }
        }

        let pack_name = format!("{}{}.ftl", LOCALE_PREFIX, code);
        if let Some(ftl) = source.read_resource(&pack_name) {
            if let Some(res) = parse_resource(&pack_name, ftl) {
                bundle.add_resource_overriding(res);
            }
        }

        Self {
            code: code.to_string(),
            bundle,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Message text for `id`, or `id` itself when there is none.
    pub fn tr(&self, id: &str) -> String {
        if let Some(msg) = self.bundle.get_message(id) {
            if let Some(pattern) = msg.value() {
                let mut errors = vec![];
                let value: Cow<str> = self.bundle.format_pattern(pattern, None, &mut errors);
                return value.into_owned();
            }
        }
        id.to_string()
    }
}
