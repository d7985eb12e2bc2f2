use std::time::Instant;

use eframe::egui;

use crate::{particles::Bounds, ui::RunState};

pub struct InfoPanel {
    pub last_update: Instant,
    pub frame_rates: [f64; 30],
    pub frame_rate_index: usize,
    pub bounds: Option<Bounds>,
}

/// `524288` -> `524,288`
pub fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, c) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl InfoPanel {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            frame_rates: [0.0; 30],
            frame_rate_index: 0,
            bounds: None,
        }
    }

    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = Some(bounds);
    }

    pub fn render(
        &mut self,
        ui: &mut egui::Ui,
        population: usize,
        run_state: RunState,
        ticks: u64,
        mirror: bool,
    ) {
        let upd_time = Instant::now();
        let elapsed = upd_time.duration_since(self.last_update);
        self.last_update = upd_time;

        self.frame_rates[self.frame_rate_index] = 1.0 / elapsed.as_secs_f64().max(1e-6);
        self.frame_rate_index = (self.frame_rate_index + 1) % self.frame_rates.len();
        let avg_frame_rate = self.frame_rates.iter().sum::<f64>() / self.frame_rates.len() as f64;

        ui.vertical(|ui| {
            ui.label(format!("FPS: {}", avg_frame_rate as u32));
            ui.label(format!("Particles: {}", group_thousands(population)));
            ui.label(format!("State: {run_state}"));
            ui.label(format!("Ticks: {ticks}"));
            ui.separator();
            if mirror {
                match &self.bounds {
                    Some(bounds) => {
                        let extent = bounds.extent();
                        ui.label(format!("Extent: {:.3} x {:.3}", extent.x, extent.y));
                    }
                    None => {
                        ui.label("Extent: pending");
                    }
                }
            } else {
                ui.label("Host mirror: off");
            }
            ui.separator();
            ui.label("R run, S stop, E edit, P toggle host mirror");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::group_thousands;

    #[test]
    fn thousands_are_grouped() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(524_288), "524,288");
        assert_eq!(group_thousands(1_000_003), "1,000,003");
    }
}
