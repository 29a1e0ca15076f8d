mod image_file;
mod mode;
mod palette;

pub use image_file::ImageFile;
pub use mode::{Mode, SubjectKind};
pub use palette::{find_swatch, normalize_color, Swatch, DEFAULT_BACKGROUND_COLOR, PALETTE};
