// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command record family tests

use crate::core::gpu::commands::*;
use crate::core::gpu::{DrawingArea, TextureWindow};

#[test]
fn test_command_type_routing_boundary() {
    // Everything after Shutdown goes to the backend, nothing before it.
    assert!(!CommandType::Wraparound.is_backend_command());
    assert!(!CommandType::AsyncCall.is_backend_command());
    assert!(!CommandType::Reconfigure.is_backend_command());
    assert!(!CommandType::Shutdown.is_backend_command());
    assert!(CommandType::ClearVram.is_backend_command());
    assert!(CommandType::UpdateDisplay.is_backend_command());
}

#[test]
fn test_command_type_from_u8() {
    for raw in 0..=20u8 {
        let ty = CommandType::from_u8(raw).unwrap();
        assert_eq!(ty as u8, raw);
    }
    assert!(CommandType::from_u8(21).is_none());
    assert!(CommandType::from_u8(0xFF).is_none());
}

#[test]
fn test_slot_size_rounding() {
    assert_eq!(align_slot_size(0), 0);
    assert_eq!(align_slot_size(1), 4);
    assert_eq!(align_slot_size(4), 4);
    assert_eq!(align_slot_size(9), 12);
    assert_eq!(align_slot_size(24), 24);
    assert_eq!(align_slot_size(25), 28);
}

#[test]
fn test_fill_vram_round_trip() {
    let cmd = FillVramCommand {
        rect: VramRect::new(16, 32, 640, 480),
        color: 0x123456,
    };
    let mut buf = vec![0u8; FillVramCommand::ENCODED_SIZE as usize];
    cmd.encode(&mut buf);
    let decoded = FillVramCommand::decode(&buf);
    assert_eq!(decoded.rect, cmd.rect);
    assert_eq!(decoded.color, 0x123456);
}

#[test]
fn test_update_display_flags_round_trip() {
    let cmd = UpdateDisplayCommand {
        vram_left: 0,
        vram_top: 240,
        vram_width: 320,
        vram_height: 240,
        start_x: 4,
        field: 1,
        display_disabled: false,
        display_24bit: true,
        interlaced: true,
        interleaved: false,
        present_frame: true,
        allow_present_skip: true,
        present_time: 0x1122_3344_5566_7788,
    };
    let mut buf = vec![0u8; UpdateDisplayCommand::ENCODED_SIZE as usize];
    cmd.encode(&mut buf);
    let decoded = UpdateDisplayCommand::decode(&buf);
    assert_eq!(decoded.vram_top, 240);
    assert_eq!(decoded.start_x, 4);
    assert_eq!(decoded.field, 1);
    assert!(decoded.display_24bit);
    assert!(decoded.interlaced);
    assert!(!decoded.interleaved);
    assert!(decoded.present_frame);
    assert!(decoded.allow_present_skip);
    assert!(!decoded.display_disabled);
    assert_eq!(decoded.present_time, 0x1122_3344_5566_7788);
}

#[test]
fn test_polygon_trailing_vertices() {
    let mut vertices = [PolygonVertex::default(); 4];
    for (i, v) in vertices.iter_mut().enumerate() {
        v.x = (i as i16) * 10;
        v.y = (i as i16) * 20 - 5;
        v.color = 0x010203 * (i as u32 + 1);
        v.u = i as u8;
        v.v = 0x80 + i as u8;
    }
    let cmd = DrawPolygonCommand {
        flags: DrawFlags::new().with_quad(true).with_shading(true),
        draw_mode: DrawMode::new(128, 256, 2, 1),
        palette: 0x1234,
        window: TextureWindow {
            mask_x: 3,
            mask_y: 1,
            offset_x: 2,
            offset_y: 0,
        },
        num_vertices: 4,
        vertices,
    };

    let size = DrawPolygonCommand::payload_size(4);
    assert_eq!(size, 12 + 4 * PolygonVertex::ENCODED_SIZE);

    let mut buf = vec![0u8; size as usize];
    cmd.encode(&mut buf);
    let decoded = DrawPolygonCommand::decode(&buf);
    assert_eq!(decoded.num_vertices, 4);
    assert!(decoded.flags.quad());
    assert!(decoded.flags.shading());
    assert_eq!(decoded.draw_mode.page_x(), 128);
    assert_eq!(decoded.draw_mode.page_y(), 256);
    assert_eq!(decoded.draw_mode.blend_mode(), 2);
    assert_eq!(decoded.draw_mode.texture_depth(), 1);
    assert_eq!(decoded.window, cmd.window);
    for i in 0..4 {
        assert_eq!(decoded.vertices[i], cmd.vertices[i]);
    }
}

#[test]
fn test_precise_polygon_native_projection() {
    let vertex = PreciseVertex {
        x: 10.75,
        y: -3.25,
        native_x: 11,
        native_y: -3,
        color: 0xAABBCC,
        u: 7,
        v: 9,
    };
    let mut buf = vec![0u8; PreciseVertex::ENCODED_SIZE as usize];
    vertex.encode(&mut buf);
    let decoded = PreciseVertex::decode(&buf);
    assert_eq!(decoded, vertex);

    let native = decoded.to_native();
    assert_eq!(native.x, 11);
    assert_eq!(native.y, -3);
    assert_eq!(native.color, 0xAABBCC);
}

#[test]
fn test_line_command_vertex_list() {
    let cmd = DrawLineCommand {
        flags: DrawFlags::new().with_shading(true),
        draw_mode: DrawMode::new(0, 0, 1, 0),
        vertices: vec![
            LineVertex {
                x: -10,
                y: 5,
                color: 0xFF0000,
            },
            LineVertex {
                x: 100,
                y: 200,
                color: 0x00FF00,
            },
            LineVertex {
                x: 300,
                y: 400,
                color: 0x0000FF,
            },
        ],
    };
    let size = DrawLineCommand::payload_size(3);
    let mut buf = vec![0u8; size as usize];
    cmd.encode(&mut buf);
    let decoded = DrawLineCommand::decode(&buf);
    assert_eq!(decoded.vertices.len(), 3);
    assert_eq!(decoded.vertices[0].x, -10);
    assert_eq!(decoded.vertices[2].color, 0x0000FF);
    assert!(decoded.flags.shading());
}

#[test]
fn test_boxed_payload_round_trip() {
    let mut buf = vec![0u8; 8];
    encode_boxed(&mut buf, Box::new(String::from("in-place payload")));
    let decoded = unsafe { decode_boxed::<String>(&buf) };
    assert_eq!(*decoded, "in-place payload");
}

#[test]
fn test_decode_update_vram_borrows_data() {
    let rect = VramRect::new(2, 3, 4, 1);
    let mut payload = vec![0u8; (VramRect::ENCODED_SIZE + 8) as usize];
    rect.encode(&mut payload);
    for (i, byte) in payload[VramRect::ENCODED_SIZE as usize..].iter_mut().enumerate() {
        *byte = i as u8;
    }
    match decode_backend_command(CommandType::UpdateVram, &payload) {
        BackendCommand::UpdateVram(decoded, data) => {
            assert_eq!(decoded, rect);
            assert_eq!(data.len(), 8);
            assert_eq!(data[3], 3);
        }
        _ => panic!("wrong variant"),
    }
}

#[test]
fn test_drawing_area_encoding() {
    let cmd = SetDrawingAreaCommand {
        area: DrawingArea {
            left: 10,
            top: 20,
            right: 600,
            bottom: 400,
        },
    };
    let mut buf = vec![0u8; SetDrawingAreaCommand::ENCODED_SIZE as usize];
    cmd.encode(&mut buf);
    let decoded = SetDrawingAreaCommand::decode(&buf);
    assert_eq!(decoded.area, cmd.area);
}

#[test]
fn test_update_clut_position() {
    let cmd = UpdateClutCommand {
        // X step 16, so 5 means pixel 80; Y is 300.
        reg: 5 | (300 << 6),
        clut_is_8bit: true,
    };
    assert_eq!(cmd.x(), 80);
    assert_eq!(cmd.y(), 300);

    let mut buf = vec![0u8; UpdateClutCommand::ENCODED_SIZE as usize];
    cmd.encode(&mut buf);
    let decoded = UpdateClutCommand::decode(&buf);
    assert_eq!(decoded.reg, cmd.reg);
    assert!(decoded.clut_is_8bit);
}
