mod yuv;

pub use yuv::{pack_rgb, yuv_to_packed, FrameConverter};
