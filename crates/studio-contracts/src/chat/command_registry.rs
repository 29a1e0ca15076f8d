#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub arg_key: &'static str,
}

/// Commands whose argument is kept verbatim (trimmed).
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "mode",
        action: "set_mode",
        arg_key: "mode",
    },
    CommandSpec {
        command: "color",
        action: "set_color",
        arg_key: "color",
    },
    CommandSpec {
        command: "prompt",
        action: "set_prompt",
        arg_key: "text",
    },
    CommandSpec {
        command: "refine",
        action: "refine",
        arg_key: "text",
    },
    CommandSpec {
        command: "image_model",
        action: "set_image_model",
        arg_key: "model",
    },
    CommandSpec {
        command: "clear",
        action: "clear_image",
        arg_key: "target",
    },
];

/// Commands taking one (possibly quoted) filesystem path.
pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "set_main_image",
        arg_key: "path",
    },
    CommandSpec {
        command: "garment",
        action: "set_main_image",
        arg_key: "path",
    },
    CommandSpec {
        command: "model_photo",
        action: "set_model_image",
        arg_key: "path",
    },
    CommandSpec {
        command: "save",
        action: "save_result",
        arg_key: "path",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
        arg_key: "",
    },
    CommandSpec {
        command: "convert",
        action: "generate",
        arg_key: "",
    },
    CommandSpec {
        command: "regenerate",
        action: "regenerate",
        arg_key: "",
    },
    CommandSpec {
        command: "status",
        action: "status",
        arg_key: "",
    },
    CommandSpec {
        command: "modes",
        action: "list_modes",
        arg_key: "",
    },
    CommandSpec {
        command: "colors",
        action: "list_colors",
        arg_key: "",
    },
    CommandSpec {
        command: "help",
        action: "help",
        arg_key: "",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
        arg_key: "",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
        arg_key: "",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/mode",
    "/modes",
    "/upload",
    "/garment",
    "/model_photo",
    "/clear",
    "/color",
    "/colors",
    "/prompt",
    "/generate",
    "/convert",
    "/refine",
    "/regenerate",
    "/save",
    "/image_model",
    "/status",
    "/quit",
];
