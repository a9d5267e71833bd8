pub(crate) const NO_ACTION_SENTINEL: &str = "NO_ACTION";
pub(crate) const ACTION_MARKER: &str = "ACTION:";
pub(crate) const MIN_ACTION_CHARS: usize = 5;

/// Words of this length or shorter are ignored by the duplicate check.
pub(crate) const SIMILARITY_IGNORED_TOKEN_CHARS: usize = 3;

pub(crate) const DEFAULT_FINGERPRINT_STRIDE: usize = 97;
pub(crate) const DEFAULT_SPEAKER: &str = "speaker";
pub(crate) const AUDIO_SPEAKER: &str = "user";

pub(crate) const ERROR_BODY_PREVIEW_CHARS: usize = 240;

pub(crate) const ACTION_VERBS: &[&str] = &[
    "click", "select", "enter", "type", "configure", "open", "navigate", "submit", "create",
    "save", "delete", "remove", "edit", "update", "choose", "fill", "upload", "download",
    "drag", "drop", "scroll", "toggle", "enable", "disable", "login", "log", "sign", "search",
    "add", "run", "install", "copy", "paste", "press", "check", "set", "switch", "expand",
];

pub(crate) const PROCEDURAL_KEYWORDS: &[&str] = &[
    "step", "steps", "first", "then", "next", "finally", "click", "configure", "navigate",
    "verify", "select", "open", "enter", "submit", "create", "install", "setup", "save",
    "afterwards",
];

pub(crate) const PROCEDURAL_PHRASES: &[&str] = &["after that", "make sure", "go to", "once you"];
