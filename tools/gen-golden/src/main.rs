// Renders a synthetic moving-target sequence and dumps per-frame golden
// response maps (testdata/golden/frame_NNN.bin) plus the input PNGs.
use std::{fs::File, io::Write, path::Path};

use image::{GrayImage, Luma};
use stmd::{frame_from_gray, PipelineParams, StmdPipeline};

const W: u32 = 128;
const H: u32 = 64;
const FRAMES: usize = 60;

fn write_golden(path_out: &Path, w: usize, h: usize, data: &[f32]) -> std::io::Result<()> {
    let mut f = File::create(path_out)?;
    f.write_all(&(w as u32).to_le_bytes())?;
    f.write_all(&(h as u32).to_le_bytes())?;
    for v in data {
        f.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Bright sky, dark 3x3 target crossing left to right at one pixel per frame.
fn render_frame(t: usize) -> GrayImage {
    let mut img = GrayImage::from_pixel(W, H, Luma([220u8]));
    let cx = 10 + t as i32;
    let cy = (H / 2) as i32;
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            let x = cx + dx;
            let y = cy + dy;
            if x >= 0 && y >= 0 && x < W as i32 && y < H as i32 {
                img.put_pixel(x as u32, y as u32, Luma([20u8]));
            }
        }
    }
    img
}

fn main() -> anyhow::Result<()> {
    std::fs::create_dir_all("testdata/images")?;
    std::fs::create_dir_all("testdata/golden")?;

    let mut pipeline = StmdPipeline::new(PipelineParams::default());
    pipeline.init_config()?;

    for t in 0..FRAMES {
        let img = render_frame(t);
        let png = Path::new("testdata/images").join(format!("frame_{t:03}.png"));
        img.save(&png)?;

        let resp = pipeline.process(&frame_from_gray(&img))?.response;
        let out = Path::new("testdata/golden").join(format!("frame_{t:03}.bin"));
        write_golden(&out, resp.w, resp.h, &resp.data)?;
        println!("golden: {:?} -> {:?}", png, out);
    }
    Ok(())
}
