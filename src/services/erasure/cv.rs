// OpenCV inpainting (photo::inpaint)

use image::RgbaImage;
use ndarray::Array2;
use opencv::core::{Mat, Scalar, Vec3b, VecN, CV_8UC1, CV_8UC3};
use opencv::photo;
use opencv::prelude::*;

use crate::core::config::InpaintMethod;
use crate::core::errors::{ErasureError, ErasureResult};

/// OpenCV flag for `method`, `None` when it has no OpenCV counterpart.
pub(crate) fn flags_for(method: InpaintMethod) -> Option<i32> {
    match method {
        InpaintMethod::FastMarching => Some(photo::INPAINT_TELEA),
        InpaintMethod::Diffusion => Some(photo::INPAINT_NS),
        InpaintMethod::Disabled => None,
    }
}

/// Inpaint the masked pixels of `img` with `cv::inpaint`.
///
/// Colour channels go through OpenCV; alpha and every unmasked pixel are
/// left as they were.
pub(crate) fn inpaint(img: &mut RgbaImage, mask: &Array2<bool>, radius: u32, flags: i32) -> ErasureResult<()> {
    if mask.iter().all(|&m| m) {
        return Err(ErasureError::NoKnownPixels);
    }
    let (width, height) = img.dimensions();

    // Convert to OpenCV Mats
    let mut src = Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, Scalar::all(0.0))?;
    let mut cv_mask = Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC1, Scalar::all(0.0))?;

    for (x, y, px) in img.enumerate_pixels() {
        *src.at_2d_mut::<Vec3b>(y as i32, x as i32)? = VecN([px[0], px[1], px[2]]);
        if mask[[y as usize, x as usize]] {
            *cv_mask.at_2d_mut::<u8>(y as i32, x as i32)? = 255;
        }
    }

    let mut dst = Mat::default();
    photo::inpaint(&src, &cv_mask, &mut dst, radius.max(1) as f64, flags)?;

    // Copy back the masked pixels only
    for ((y, x), &m) in mask.indexed_iter() {
        if !m {
            continue;
        }
        let VecN([r, g, b]) = *dst.at_2d::<Vec3b>(y as i32, x as i32)?;
        let px = img.get_pixel_mut(x as u32, y as u32);
        px[0] = r;
        px[1] = g;
        px[2] = b;
    }

    Ok(())
}
