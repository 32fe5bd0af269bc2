pub mod builder;
pub mod preview;
pub mod session;

pub use builder::{exclusion_circles, Detection, ExclusionCircle, MaskBuilder, MaskGeometry, MaskParams};
pub use preview::{color_composite, lupton_rgb, MaskPreview};
pub use session::{
    parse_keep_list, run_refine_loop, FinalMask, MaskSession, RefineOutcome, RefinePrompt,
    RefineResponse, ScriptedPrompt,
};
