use std::sync::Arc;

use gpui::{
    App, AppContext, Context, IntoElement, ObjectFit, ParentElement, Render, RenderImage,
    SharedString, Styled, StyledImage, TitlebarOptions, Window, WindowOptions, div, img,
};
use gpui_component::{
    Root,
    button::{Button, ButtonVariants},
    h_flex,
    tag::Tag,
    v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::pipeline::{LoopPhase, ModelState, RenderLoop, RgbaSurface, TickControl};

mod render_util;

pub fn launch_ui(app: &mut App, render: RenderLoop<RgbaSurface>) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Hand Overlay".into()),
            appears_transparent: false,
            traffic_light_position: None,
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| OverlayView::new(render));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

/// Window that hosts the render loop: every paint is one refresh tick.
struct OverlayView {
    render: RenderLoop<RgbaSurface>,
    latest_image: Option<Arc<RenderImage>>,
    hands: usize,
}

impl OverlayView {
    fn new(render: RenderLoop<RgbaSurface>) -> Self {
        Self {
            render,
            latest_image: None,
            hands: 0,
        }
    }

    fn refresh_image(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let ctx = self.render.context_mut();
        self.hands = ctx.last_result.hands.len();
        let overlay_enabled = ctx.state.overlay_enabled;
        let Some(frame) = ctx.source.as_mut().and_then(|source| source.current_frame()) else {
            return;
        };
        let overlay = overlay_enabled.then_some(&ctx.surface);
        if let Some(image) = render_util::composite_image(frame, overlay) {
            self.replace_latest_image(image, window, cx);
        }
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // The sprite atlas keeps every frame unless the old texture is dropped.
            cx.drop_image(old_image, Some(window));
        }
    }

    fn status_line(&self) -> String {
        let model = self.render.model_state();
        let video = match self.render.phase() {
            LoopPhase::Idle if self.render.context().source.is_none() => "no camera",
            LoopPhase::Idle => "waiting for video",
            LoopPhase::Running => "live",
            LoopPhase::Stopped => "stopped",
        };
        match model {
            ModelState::Ready => format!("{video} | model ready | hands: {}", self.hands),
            _ => format!("{video} | model {model}"),
        }
    }
}

impl Render for OverlayView {
    fn render(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) -> impl IntoElement {
        if self.render.on_refresh() == TickControl::Continue {
            cx.defer_in(window, |_, _, cx| {
                cx.notify();
            });
        }
        // A repeated frame leaves the surface cleared; the image already on
        // screen shows that frame with its hands.
        if !self.render.last_report().duplicate {
            self.refresh_image(window, cx);
        }

        let frame_view = if let Some(image) = &self.latest_image {
            img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element()
        } else {
            div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Waiting for camera...")
                .into_any_element()
        };

        let detection_enabled = self.render.context().state.detection_enabled;
        let mut info_row = h_flex()
            .justify_between()
            .items_center()
            .gap_2()
            .p_2()
            .child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(0xa0aab8))
                    .child(self.status_line()),
            )
            .child(
                Button::new(SharedString::from("detection-toggle"))
                    .ghost()
                    .label(if detection_enabled {
                        "Pause detection"
                    } else {
                        "Resume detection"
                    })
                    .on_click(cx.listener(move |this, _, _, cx| {
                        this.render.set_detection_enabled(!detection_enabled);
                        cx.notify();
                    })),
            );

        let failure = self.render.context().loader.failure().map(|err| err.to_string());
        if let Some(message) = failure {
            info_row = info_row.child(Tag::danger().rounded_full().child(message));
        } else if !self.render.context().state.overlay_enabled {
            info_row = info_row.child(Tag::danger().rounded_full().child("overlay disabled"));
        }

        v_flex()
            .size_full()
            .bg(gpui::rgb(0x000000))
            .child(div().flex_1().overflow_hidden().child(frame_view))
            .child(info_row)
    }
}

impl Drop for OverlayView {
    fn drop(&mut self) {
        self.render.stop();
        // Dropping the source stops the capture thread and releases the device.
        self.render.context_mut().source = None;
    }
}
