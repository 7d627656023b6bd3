mod app;
mod settings;
mod theme;
mod workers;

use app::App;

fn main() -> iced::Result {
    env_logger::init();

    iced::application(App::new, App::update, App::view)
        .title("Face Blur App")
        .theme(App::theme)
        .subscription(App::subscription)
        .window(iced::window::Settings {
            size: iced::Size::new(350.0, 420.0),
            min_size: Some(iced::Size::new(350.0, 300.0)),
            ..Default::default()
        })
        .run()
}
