//! Individual degradation steps
//!
//! Each returns `true` only when it changed the graph or a device.

use crate::buffer::{DevicePosition, MediaKind};
use crate::config::DegradationConfig;
use crate::graph::{camera_device_at, lock_device, transaction, CaptureGraph, DeviceType};
use crate::timing::MediaTime;

/// Switch the camera at `position` to the next smaller multi-cam format.
///
/// Walks the format list backward from the active format. Refuses once the
/// active format fits inside the configured minimum.
pub fn reduce_resolution<G: CaptureGraph + ?Sized>(
    graph: &mut G,
    position: DevicePosition,
    config: &DegradationConfig,
) -> bool {
    let Some(device) = camera_device_at(&*graph, position) else {
        log::debug!("No {} camera connected; cannot reduce resolution", position);
        return false;
    };
    let Some(active) = device.active_format() else {
        return false;
    };

    if active.fits_within(config.min_width, config.min_height) {
        return false;
    }

    let formats = device.formats();
    let Some(active_index) = formats.iter().position(|f| *f == active) else {
        log::warn!("Active format {} of {} camera not in its format list", active, position);
        return false;
    };

    let Some(format) = formats[..active_index]
        .iter()
        .rev()
        .find(|f| f.multi_cam_supported && f.is_smaller_than(&active))
    else {
        return false;
    };

    let lock = match lock_device(device.as_ref()) {
        Ok(lock) => lock,
        Err(e) => {
            log::warn!("Could not lock {} camera for configuration: {}", position, e);
            return false;
        }
    };
    if let Err(e) = lock.device().set_active_format(format) {
        log::warn!("Could not set {} camera format {}: {}", position, format, e);
        return false;
    }

    log::info!("Reduced {} camera resolution {} -> {}", position, active, format);
    true
}

/// Lower the maximum frame rate of the camera at `position` by one step,
/// never below the configured floor.
pub fn reduce_frame_rate<G: CaptureGraph + ?Sized>(
    graph: &mut G,
    position: DevicePosition,
    config: &DegradationConfig,
) -> bool {
    let Some(device) = camera_device_at(&*graph, position) else {
        log::debug!("No {} camera connected; cannot reduce frame rate", position);
        return false;
    };

    let current = device.active_min_frame_duration().as_frame_rate();
    let reduced = current - config.frame_rate_step;
    if reduced < config.min_frame_rate {
        return false;
    }

    let lock = match lock_device(device.as_ref()) {
        Ok(lock) => lock,
        Err(e) => {
            log::warn!("Could not lock {} camera for configuration: {}", position, e);
            return false;
        }
    };
    if let Err(e) = lock
        .device()
        .set_min_frame_duration_override(MediaTime::frame_duration(reduced))
    {
        log::warn!("Could not cap {} camera at {} fps: {}", position, reduced, e);
        return false;
    }

    log::info!("Reduced {} camera fps {} -> {}", position, current, reduced);
    true
}

/// Re-source every connection fed by a dual-lens virtual device from that
/// input's wide-angle port instead.
///
/// When a replacement cannot be added the removed connection stays removed
/// and the step fails.
pub fn reduce_video_input_ports<G: CaptureGraph + ?Sized>(graph: &mut G) -> bool {
    let mut changed = false;

    for connection in graph.connections() {
        let Some(dual_port) = connection
            .ports()
            .iter()
            .find(|p| p.source_device_type == DeviceType::BuiltInDualCamera)
            .copied()
        else {
            continue;
        };

        log::info!("Changing connection {:?} from dual to single camera", connection.id);

        let position = graph
            .input_device(dual_port.input)
            .and_then(|device| device.position());
        let Some(wide_port) = graph
            .ports(
                dual_port.input,
                MediaKind::Video,
                DeviceType::BuiltInWideAngleCamera,
                position,
            )
            .into_iter()
            .next()
        else {
            log::warn!("No wide-angle port on input {:?}", dual_port.input);
            return false;
        };

        let replacement = connection.spec.rewired(wide_port);

        let mut tx = transaction(graph);
        tx.remove_connection(connection.id);
        if let Err(e) = tx.add_connection(replacement) {
            log::warn!("Could not add new connection to the session: {}", e);
            return false;
        }
        changed = true;
    }

    changed
}
