//! Quartz event services and window server capture.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use core_foundation::array::CFArray;
use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::CFDictionary;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::base::{kCGBitmapByteOrder32Big, kCGImageAlphaPremultipliedLast};
use core_graphics::color_space::CGColorSpace;
use core_graphics::context::CGContext;
use core_graphics::display::CGDisplay;
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTapLocation, CGEventType, CGMouseButton, EventField,
    ScrollEventUnit,
};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use core_graphics::image::CGImage;
use core_graphics::window::{
    self, kCGNullWindowID, kCGWindowImageBestResolution, kCGWindowImageBoundsIgnoreFraming,
    kCGWindowListExcludeDesktopElements, kCGWindowListOptionAll,
    kCGWindowListOptionIncludingWindow, CGWindowListCopyWindowInfo,
};
use image::RgbaImage;
use tracing::{debug, trace};

use crate::backend::native::{
    EventTarget, InputEvent, ModifierFlags, NativeError, NativePlatform, NativeResult,
    WindowRecord,
};
use crate::backend::types::{MouseButton, Point, RawPixels};

const CAPTURE_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
/// Unicode string length a single keyboard event carries reliably
const TEXT_CHUNK: usize = 20;

pub struct MacPlatform;

impl MacPlatform {
    pub fn new() -> NativeResult<Self> {
        source()?;
        let bounds = CGDisplay::main().bounds();
        if bounds.size.width <= 0.0 || bounds.size.height <= 0.0 {
            return Err(NativeError::Unavailable("no main display".to_string()));
        }
        debug!(
            width = bounds.size.width,
            height = bounds.size.height,
            "Native event source ready"
        );
        Ok(Self)
    }
}

fn source() -> NativeResult<CGEventSource> {
    CGEventSource::new(CGEventSourceStateID::HIDSystemState)
        .map_err(|_| NativeError::Unavailable("cannot create HID event source".to_string()))
}

impl NativePlatform for MacPlatform {
    fn display_size(&self) -> NativeResult<(u32, u32)> {
        let bounds = CGDisplay::main().bounds();
        Ok((bounds.size.width as u32, bounds.size.height as u32))
    }

    fn capture_display(&self) -> NativeResult<RgbaImage> {
        let display = CGDisplay::main();
        let image = display.image().ok_or(NativeError::NoImage(display.id))?;
        render_rgba(&image).ok_or(NativeError::Unserializable(display.id))
    }

    fn windows(&self) -> NativeResult<Vec<WindowRecord>> {
        let options = kCGWindowListOptionAll | kCGWindowListExcludeDesktopElements;

        let window_list: CFArray<CFDictionary<CFString, CFType>> = unsafe {
            let list_ref = CGWindowListCopyWindowInfo(options, kCGNullWindowID);
            if list_ref.is_null() {
                return Err(NativeError::Unavailable("window list unavailable".to_string()));
            }
            CFArray::wrap_under_create_rule(list_ref)
        };

        let mut windows = Vec::new();
        for i in 0..window_list.len() {
            if let Some(dict) = window_list.get(i) {
                if let Some(window) = parse_window_dict(&dict) {
                    windows.push(window);
                }
            }
        }
        trace!(count = windows.len(), "Listed windows");
        Ok(windows)
    }

    fn snapshot_window(&self, window: &WindowRecord) -> NativeResult<RgbaImage> {
        let image = window_image(window)?;
        render_rgba(&image).ok_or(NativeError::Unserializable(window.id))
    }

    fn capture_window_to_file(&self, window: &WindowRecord, path: &Path) -> NativeResult<()> {
        let mut command = Command::new("screencapture");
        command
            .arg("-l")
            .arg(window.id.to_string())
            .arg("-x")
            .arg("-o")
            .arg(path);
        run_with_timeout(command, CAPTURE_COMMAND_TIMEOUT)?;

        let written = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(NativeError::Command(format!(
                "screencapture wrote no image for window {}",
                window.id
            )));
        }
        Ok(())
    }

    fn window_pixels(&self, window: &WindowRecord) -> NativeResult<RawPixels> {
        let image = window_image(window)?;
        let data = image.data();
        let bytes = data.bytes();
        if bytes.is_empty() {
            return Err(NativeError::NoImage(window.id));
        }
        Ok(RawPixels {
            width: image.width(),
            height: image.height(),
            bytes_per_row: image.bytes_per_row(),
            bits_per_pixel: image.bits_per_pixel(),
            data: bytes.to_vec(),
        })
    }

    fn cursor_location(&self) -> NativeResult<Point> {
        let event = CGEvent::new(source()?).map_err(|_| NativeError::EventCreation("query"))?;
        let location = event.location();
        Ok(Point::new(location.x as i32, location.y as i32))
    }

    fn post(&self, event: &InputEvent, target: EventTarget) -> NativeResult<()> {
        match event {
            InputEvent::MouseMove { at } => {
                let e = mouse_event(CGEventType::MouseMoved, *at, CGMouseButton::Left)?;
                deliver(&e, target);
            }
            InputEvent::MouseDown {
                at,
                button,
                click_count,
            } => {
                let (kind, _) = button_events(*button);
                let e = mouse_event(kind, *at, cg_button(*button))?;
                e.set_integer_value_field(EventField::MOUSE_EVENT_CLICK_STATE, *click_count);
                deliver(&e, target);
            }
            InputEvent::MouseUp {
                at,
                button,
                click_count,
            } => {
                let (_, kind) = button_events(*button);
                let e = mouse_event(kind, *at, cg_button(*button))?;
                e.set_integer_value_field(EventField::MOUSE_EVENT_CLICK_STATE, *click_count);
                deliver(&e, target);
            }
            InputEvent::MouseDrag { at } => {
                let e = mouse_event(CGEventType::LeftMouseDragged, *at, CGMouseButton::Left)?;
                deliver(&e, target);
            }
            InputEvent::Scroll { amount } => {
                let e = CGEvent::new_scroll_event(source()?, ScrollEventUnit::LINE, 1, *amount, 0, 0)
                    .map_err(|_| NativeError::EventCreation("scroll"))?;
                deliver(&e, target);
            }
            InputEvent::KeyDown { keycode, flags } => {
                deliver(&key_event(*keycode, *flags, true)?, target);
            }
            InputEvent::KeyUp { keycode, flags } => {
                deliver(&key_event(*keycode, *flags, false)?, target);
            }
            InputEvent::Text { text } => {
                let chars: Vec<char> = text.chars().collect();
                for chunk in chars.chunks(TEXT_CHUNK) {
                    let chunk: String = chunk.iter().collect();
                    for down in [true, false] {
                        let e = key_event(0, ModifierFlags::default(), down)?;
                        e.set_string(&chunk);
                        deliver(&e, target);
                    }
                }
            }
        }
        Ok(())
    }
}

fn deliver(event: &CGEvent, target: EventTarget) {
    match target {
        EventTarget::Global => event.post(CGEventTapLocation::HID),
        EventTarget::Process(pid) => event.post_to_pid(pid),
    }
}

fn mouse_event(kind: CGEventType, at: Point, button: CGMouseButton) -> NativeResult<CGEvent> {
    let point = CGPoint::new(at.x as f64, at.y as f64);
    CGEvent::new_mouse_event(source()?, kind, point, button)
        .map_err(|_| NativeError::EventCreation("mouse"))
}

fn key_event(keycode: u16, flags: ModifierFlags, down: bool) -> NativeResult<CGEvent> {
    let event = CGEvent::new_keyboard_event(source()?, keycode, down)
        .map_err(|_| NativeError::EventCreation("keyboard"))?;
    event.set_flags(cg_flags(flags));
    Ok(event)
}

fn cg_flags(flags: ModifierFlags) -> CGEventFlags {
    let mut cg = CGEventFlags::CGEventFlagNull;
    if flags.command {
        cg |= CGEventFlags::CGEventFlagCommand;
    }
    if flags.shift {
        cg |= CGEventFlags::CGEventFlagShift;
    }
    if flags.option {
        cg |= CGEventFlags::CGEventFlagAlternate;
    }
    if flags.control {
        cg |= CGEventFlags::CGEventFlagControl;
    }
    cg
}

fn cg_button(button: MouseButton) -> CGMouseButton {
    match button {
        MouseButton::Left => CGMouseButton::Left,
        MouseButton::Right => CGMouseButton::Right,
        MouseButton::Middle => CGMouseButton::Center,
    }
}

fn button_events(button: MouseButton) -> (CGEventType, CGEventType) {
    match button {
        MouseButton::Left => (CGEventType::LeftMouseDown, CGEventType::LeftMouseUp),
        MouseButton::Right => (CGEventType::RightMouseDown, CGEventType::RightMouseUp),
        MouseButton::Middle => (CGEventType::OtherMouseDown, CGEventType::OtherMouseUp),
    }
}

fn window_image(window: &WindowRecord) -> NativeResult<CGImage> {
    let rect = CGRect::new(
        &CGPoint::new(window.x, window.y),
        &CGSize::new(window.width, window.height),
    );
    window::create_image(
        rect,
        kCGWindowListOptionIncludingWindow,
        window.id,
        kCGWindowImageBoundsIgnoreFraming | kCGWindowImageBestResolution,
    )
    .ok_or(NativeError::NoImage(window.id))
}

/// Draw into an RGBA bitmap. `None` when nothing visible was rendered,
/// which is what GPU-backed or protected windows produce.
fn render_rgba(image: &CGImage) -> Option<RgbaImage> {
    let width = image.width();
    let height = image.height();
    if width == 0 || height == 0 {
        return None;
    }

    let color_space = CGColorSpace::create_device_rgb();
    let mut context = CGContext::create_bitmap_context(
        None,
        width,
        height,
        8,
        width * 4,
        &color_space,
        kCGImageAlphaPremultipliedLast | kCGBitmapByteOrder32Big,
    );
    let rect = CGRect::new(
        &CGPoint::new(0.0, 0.0),
        &CGSize::new(width as f64, height as f64),
    );
    context.draw_image(rect, image);

    let pixels = context.data().to_vec();
    if pixels.chunks_exact(4).all(|px| px[3] == 0) {
        return None;
    }
    RgbaImage::from_raw(width as u32, height as u32, pixels)
}

fn run_with_timeout(mut command: Command, timeout: Duration) -> NativeResult<()> {
    let mut child = command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait()? {
            if status.success() {
                return Ok(());
            }
            return Err(NativeError::Command(format!(
                "screencapture exited with {}",
                status
            )));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(NativeError::Command(format!(
                "screencapture timed out after {}s",
                timeout.as_secs()
            )));
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn parse_window_dict(dict: &CFDictionary<CFString, CFType>) -> Option<WindowRecord> {
    let id = get_dict_number(dict, "kCGWindowNumber")? as u32;
    let owner_pid = get_dict_number(dict, "kCGWindowOwnerPID")? as i32;
    let layer = get_dict_number(dict, "kCGWindowLayer").unwrap_or(0) as i32;
    let (x, y, width, height) = get_window_bounds(dict)?;
    let title = get_dict_string(dict, "kCGWindowName").unwrap_or_default();

    Some(WindowRecord {
        id,
        owner_pid,
        layer,
        x,
        y,
        width,
        height,
        title,
    })
}

fn get_dict_number(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<i64> {
    let cf_key = CFString::new(key);
    dict.find(&cf_key).and_then(|value| {
        if value.type_of() == CFNumber::type_id() {
            let num: CFNumber =
                unsafe { CFNumber::wrap_under_get_rule(value.as_CFTypeRef() as *const _) };
            num.to_i64()
        } else {
            None
        }
    })
}

fn get_dict_f64(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<f64> {
    let cf_key = CFString::new(key);
    dict.find(&cf_key).and_then(|value| {
        if value.type_of() == CFNumber::type_id() {
            let num: CFNumber =
                unsafe { CFNumber::wrap_under_get_rule(value.as_CFTypeRef() as *const _) };
            num.to_f64()
        } else {
            None
        }
    })
}

fn get_dict_string(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<String> {
    let cf_key = CFString::new(key);
    dict.find(&cf_key).and_then(|value| {
        if value.type_of() == CFString::type_id() {
            let s: CFString =
                unsafe { CFString::wrap_under_get_rule(value.as_CFTypeRef() as *const _) };
            Some(s.to_string())
        } else {
            None
        }
    })
}

fn get_window_bounds(dict: &CFDictionary<CFString, CFType>) -> Option<(f64, f64, f64, f64)> {
    let cf_key = CFString::new("kCGWindowBounds");
    let bounds_dict = dict.find(&cf_key)?;
    if bounds_dict.type_of() != CFDictionary::<CFString, CFType>::type_id() {
        return None;
    }
    let bounds: CFDictionary<CFString, CFType> =
        unsafe { CFDictionary::wrap_under_get_rule(bounds_dict.as_CFTypeRef() as *const _) };

    Some((
        get_dict_f64(&bounds, "X")?,
        get_dict_f64(&bounds, "Y")?,
        get_dict_f64(&bounds, "Width")?,
        get_dict_f64(&bounds, "Height")?,
    ))
}
