use crate::models::yolo::PredictedBox;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

/// 边框线宽（像素）
const THICKNESS: i32 = 2;

/// 每个类别一种颜色，按 class_id 取模索引
const PALETTE: [[u8; 3]; 10] = [
    [0, 200, 0],
    [0, 140, 255],
    [220, 0, 0],
    [255, 0, 120],
    [255, 60, 60],
    [0, 120, 220],
    [255, 160, 0],
    [40, 180, 120],
    [160, 60, 200],
    [120, 120, 120],
];

/// 把检测框画到帧上，坐标越界的部分裁剪到图内
pub fn draw_boxes(image: &mut RgbImage, boxes: &[PredictedBox]) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    if width == 0 || height == 0 {
        return;
    }

    for b in boxes {
        let x1 = (b.x1.round() as i32).clamp(0, width - 1);
        let y1 = (b.y1.round() as i32).clamp(0, height - 1);
        let x2 = (b.x2.round() as i32).clamp(0, width - 1);
        let y2 = (b.y2.round() as i32).clamp(0, height - 1);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        let color = Rgb(PALETTE[b.class_id % PALETTE.len()]);
        let w = (x2 - x1 + 1) as u32;
        let h = (y2 - y1 + 1) as u32;
        let tw = THICKNESS.min(x2 - x1 + 1) as u32;
        let th = THICKNESS.min(y2 - y1 + 1) as u32;

        // 上下两条横边
        draw_filled_rect_mut(image, Rect::at(x1, y1).of_size(w, th), color);
        draw_filled_rect_mut(image, Rect::at(x1, y2 - th as i32 + 1).of_size(w, th), color);
        // 左右两条竖边
        draw_filled_rect_mut(image, Rect::at(x1, y1).of_size(tw, h), color);
        draw_filled_rect_mut(image, Rect::at(x2 - tw as i32 + 1, y1).of_size(tw, h), color);
    }
}
