//! Deterministic replies used when the language model is unavailable.
//!
//! The user's text is matched against multilingual keyword groups; each
//! group selects an entry from the reply table of the target language.
//! Unmatched input gets a generic acknowledgement echoing the text back.

use std::sync::LazyLock;

use regex::Regex;

use crate::language::LanguageTag;
use crate::types::{Animation, FacialExpression, ReplyMessage};

/// Conversation topics recognized by keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    HowAreYou,
    Hello,
    Weather,
    Travel,
    Name,
    Generic,
}

struct ReplyTable {
    hello: &'static str,
    how_are_you: &'static str,
    weather: &'static str,
    travel: [&'static str; 2],
    name: &'static str,
    /// `{text}` is replaced by the user's input.
    generic: [&'static str; 2],
}

const EN: ReplyTable = ReplyTable {
    hello: "Hello there! It's great to meet you. What's on your mind today?",
    how_are_you: "I'm doing wonderfully, thank you for asking! How are you doing today?",
    weather: "I don't have access to current weather data, but I'd love to chat about weather patterns or travel destinations with great climates!",
    travel: [
        "Ah, travel! One of my favorite topics. I've been fortunate to explore many places around the world.",
        "Where are you thinking of going, or would you like some travel recommendations?",
    ],
    name: "I'm Jack! I'm a digital human who loves traveling and meeting new people. What's your name?",
    generic: [
        "That's interesting! You mentioned \"{text}\". I'd love to learn more about that.",
        "Tell me more about what you're thinking, and I'll do my best to help!",
    ],
};

const ES: ReplyTable = ReplyTable {
    hello: "¡Hola! Es genial conocerte. ¿Qué tienes en mente hoy?",
    how_are_you: "¡Estoy muy bien, gracias por preguntar! ¿Cómo estás tú hoy?",
    weather: "No tengo acceso a datos meteorológicos actuales, ¡pero me encantaría hablar sobre patrones climáticos o destinos de viaje con excelentes climas!",
    travel: [
        "¡Ah, viajar! Uno de mis temas favoritos. He tenido la fortuna de explorar muchos lugares alrededor del mundo.",
        "¿A dónde estás pensando ir, o te gustaría algunas recomendaciones de viaje?",
    ],
    name: "¡Soy Jack! Soy un humano digital que ama viajar y conocer gente nueva. ¿Cómo te llamas?",
    generic: [
        "¡Eso es interesante! Mencionaste \"{text}\". Me encantaría saber más sobre eso.",
        "¡Cuéntame más sobre lo que estás pensando, y haré mi mejor esfuerzo para ayudar!",
    ],
};

const FR: ReplyTable = ReplyTable {
    hello: "Bonjour ! C'est formidable de vous rencontrer. À quoi pensez-vous aujourd'hui ?",
    how_are_you: "Je vais très bien, merci de demander ! Comment allez-vous aujourd'hui ?",
    weather: "Je n'ai pas accès aux données météorologiques actuelles, mais j'adorerais parler des modèles météorologiques ou des destinations de voyage avec d'excellents climats !",
    travel: [
        "Ah, les voyages ! L'un de mes sujets préférés. J'ai eu la chance d'explorer de nombreux endroits dans le monde.",
        "Où pensez-vous aller, ou aimeriez-vous quelques recommandations de voyage ?",
    ],
    name: "Je suis Jack ! Je suis un humain numérique qui aime voyager et rencontrer de nouvelles personnes. Comment vous appelez-vous ?",
    generic: [
        "C'est intéressant ! Vous avez mentionné \"{text}\". J'aimerais en savoir plus à ce sujet.",
        "Dites-moi en plus sur ce à quoi vous pensez, et je ferai de mon mieux pour vous aider !",
    ],
};

const DE: ReplyTable = ReplyTable {
    hello: "Hallo! Es ist toll, Sie kennenzulernen. Was beschäftigt Sie heute?",
    how_are_you: "Mir geht es wunderbar, danke der Nachfrage! Wie geht es Ihnen denn heute?",
    weather: "Ich habe keinen Zugang zu aktuellen Wetterdaten, aber ich würde gerne über Wettermuster oder Reiseziele mit tollen Klimabedingungen sprechen!",
    travel: [
        "Ah, Reisen! Eines meiner Lieblingsthemen. Ich hatte das Glück, viele Orte auf der ganzen Welt zu erkunden.",
        "Wo möchten Sie hinreisen, oder hätten Sie gerne einige Reiseempfehlungen?",
    ],
    name: "Ich bin Jack! Ich bin ein digitaler Mensch, der gerne reist und neue Leute kennenlernt. Wie heißen Sie?",
    generic: [
        "Das ist interessant! Sie erwähnten \"{text}\". Ich würde gerne mehr darüber erfahren.",
        "Erzählen Sie mir mehr über Ihre Gedanken, und ich werde mein Bestes geben, um zu helfen!",
    ],
};

const IT: ReplyTable = ReplyTable {
    hello: "Ciao! È un piacere conoscerti. A cosa stai pensando oggi?",
    how_are_you: "Sto benissimo, grazie per avermelo chiesto! E tu come stai oggi?",
    weather: "Non ho accesso ai dati meteo attuali, ma mi piacerebbe parlare di clima o di destinazioni di viaggio con un clima fantastico!",
    travel: [
        "Ah, i viaggi! Uno dei miei argomenti preferiti. Ho avuto la fortuna di esplorare tanti posti in giro per il mondo.",
        "Dove stai pensando di andare, o vorresti qualche consiglio di viaggio?",
    ],
    name: "Sono Jack! Sono un umano digitale che ama viaggiare e conoscere persone nuove. Come ti chiami?",
    generic: [
        "Interessante! Hai menzionato \"{text}\". Mi piacerebbe saperne di più.",
        "Raccontami di più su quello a cui stai pensando, e farò del mio meglio per aiutarti!",
    ],
};

const PT: ReplyTable = ReplyTable {
    hello: "Olá! É ótimo conhecer você. O que você tem em mente hoje?",
    how_are_you: "Estou muito bem, obrigado por perguntar! Como você está hoje?",
    weather: "Não tenho acesso a dados meteorológicos atuais, mas adoraria conversar sobre o clima ou destinos de viagem com ótimos climas!",
    travel: [
        "Ah, viajar! Um dos meus assuntos favoritos. Tive a sorte de explorar muitos lugares ao redor do mundo.",
        "Para onde você está pensando em ir, ou gostaria de algumas recomendações de viagem?",
    ],
    name: "Eu sou o Jack! Sou um humano digital que adora viajar e conhecer pessoas novas. Qual é o seu nome?",
    generic: [
        "Que interessante! Você mencionou \"{text}\". Adoraria saber mais sobre isso.",
        "Conte-me mais sobre o que você está pensando, e farei o meu melhor para ajudar!",
    ],
};

const RU: ReplyTable = ReplyTable {
    hello: "Привет! Очень рад познакомиться. О чём вы думаете сегодня?",
    how_are_you: "У меня всё замечательно, спасибо, что спросили! А как у вас дела сегодня?",
    weather: "У меня нет доступа к текущим данным о погоде, но я с удовольствием поговорю о климате или о местах для путешествий с прекрасной погодой!",
    travel: [
        "О, путешествия! Одна из моих любимых тем. Мне посчастливилось побывать во многих местах по всему миру.",
        "Куда вы думаете поехать, или хотите несколько советов для путешествия?",
    ],
    name: "Я Джек! Я цифровой человек, который любит путешествовать и знакомиться с новыми людьми. Как вас зовут?",
    generic: [
        "Как интересно! Вы упомянули «{text}». Я бы хотел узнать об этом больше.",
        "Расскажите подробнее, о чём вы думаете, и я постараюсь помочь!",
    ],
};

const JA: ReplyTable = ReplyTable {
    hello: "こんにちは！お会いできてうれしいです。今日はどんなことを考えていますか？",
    how_are_you: "とても元気です、聞いてくれてありがとう！あなたは今日どうですか？",
    weather: "現在の天気データにはアクセスできませんが、天気のことや気候の良い旅行先についてぜひお話ししたいです！",
    travel: [
        "ああ、旅行！大好きな話題の一つです。世界中のたくさんの場所を訪れることができました。",
        "どこに行こうと考えていますか？それとも旅行のおすすめを聞きたいですか？",
    ],
    name: "ジャックです！旅行と新しい人との出会いが大好きなデジタルヒューマンです。あなたのお名前は？",
    generic: [
        "面白いですね！「{text}」とおっしゃいましたね。もっと詳しく知りたいです。",
        "考えていることをもっと教えてください。できる限りお手伝いします！",
    ],
};

const ZH: ReplyTable = ReplyTable {
    hello: "你好！很高兴认识你。你今天在想些什么？",
    how_are_you: "我很好，谢谢你的关心！你今天过得怎么样？",
    weather: "我无法获取当前的天气数据，但我很乐意聊聊天气规律或气候宜人的旅行目的地！",
    travel: [
        "啊，旅行！这是我最喜欢的话题之一。我有幸探索过世界各地的许多地方。",
        "你打算去哪里，或者想要一些旅行建议吗？",
    ],
    name: "我是Jack！我是一个热爱旅行和结识新朋友的数字人。你叫什么名字？",
    generic: [
        "很有意思！你提到了“{text}”。我很想了解更多。",
        "告诉我更多你的想法，我会尽力帮助你！",
    ],
};

const AR: ReplyTable = ReplyTable {
    hello: "مرحبا! سعيد جدا بلقائك. بماذا تفكر اليوم؟",
    how_are_you: "أنا بخير تماما، شكرا لسؤالك! كيف حالك اليوم؟",
    weather: "ليس لدي وصول إلى بيانات الطقس الحالية، لكنني أحب التحدث عن أنماط الطقس أو وجهات السفر ذات المناخ الرائع!",
    travel: [
        "آه، السفر! أحد مواضيعي المفضلة. كنت محظوظا باستكشاف أماكن كثيرة حول العالم.",
        "إلى أين تفكر في الذهاب، أم تود بعض التوصيات للسفر؟",
    ],
    name: "أنا جاك! أنا إنسان رقمي يحب السفر والتعرف على أشخاص جدد. ما اسمك؟",
    generic: [
        "هذا مثير للاهتمام! لقد ذكرت \"{text}\". أود معرفة المزيد عن ذلك.",
        "أخبرني المزيد عما تفكر فيه، وسأبذل قصارى جهدي للمساعدة!",
    ],
};

const HI: ReplyTable = ReplyTable {
    hello: "नमस्ते! आपसे मिलकर बहुत अच्छा लगा। आज आप क्या सोच रहे हैं?",
    how_are_you: "मैं बहुत अच्छा हूँ, पूछने के लिए धन्यवाद! आज आप कैसे हैं?",
    weather: "मेरे पास मौजूदा मौसम की जानकारी नहीं है, लेकिन मुझे मौसम के बारे में या अच्छे मौसम वाली यात्रा की जगहों के बारे में बात करना अच्छा लगेगा!",
    travel: [
        "आह, यात्रा! मेरे पसंदीदा विषयों में से एक। मुझे दुनिया भर में कई जगहें घूमने का सौभाग्य मिला है।",
        "आप कहाँ जाने की सोच रहे हैं, या क्या आप यात्रा के कुछ सुझाव चाहेंगे?",
    ],
    name: "मैं जैक हूँ! मैं एक डिजिटल इंसान हूँ जिसे यात्रा करना और नए लोगों से मिलना पसंद है। आपका नाम क्या है?",
    generic: [
        "यह दिलचस्प है! आपने \"{text}\" का ज़िक्र किया। मैं इसके बारे में और जानना चाहूँगा।",
        "मुझे बताइए आप क्या सोच रहे हैं, और मैं मदद करने की पूरी कोशिश करूँगा!",
    ],
};

fn table(language: LanguageTag) -> &'static ReplyTable {
    match language {
        LanguageTag::En => &EN,
        LanguageTag::Es => &ES,
        LanguageTag::Fr => &FR,
        LanguageTag::De => &DE,
        LanguageTag::It => &IT,
        LanguageTag::Pt => &PT,
        LanguageTag::Ru => &RU,
        LanguageTag::Ja => &JA,
        LanguageTag::Zh => &ZH,
        LanguageTag::Ar => &AR,
        LanguageTag::Hi => &HI,
    }
}

// "How are you" runs before "hello" since 你好吗 contains 你好.
const KEYWORDS: &[(Topic, &[&str])] = &[
    (
        Topic::HowAreYou,
        &[
            "how are you",
            "como estas",
            "cómo estás",
            "comment allez",
            "wie geht",
            "come stai",
            "como está",
            "como vai",
            "как дела",
            "元気",
            "你好吗",
            "كيف حالك",
            "कैसे हैं",
        ],
    ),
    (
        Topic::Hello,
        &[
            "hello",
            "hi",
            "hey",
            "hola",
            "bonjour",
            "salut",
            "hallo",
            "ciao",
            "olá",
            "привет",
            "こんにちは",
            "你好",
            "مرحبا",
            "नमस्ते",
        ],
    ),
    (
        Topic::Weather,
        &[
            "weather", "clima", "tiempo", "temps", "météo", "wetter", "tempo", "погода", "天気",
            "天气", "طقس", "मौसम",
        ],
    ),
    (
        Topic::Travel,
        &[
            "travel",
            "trip",
            "viaje",
            "viajar",
            "voyage",
            "reise",
            "reisen",
            "viaggio",
            "viagem",
            "путешествие",
            "旅行",
            "سفر",
            "यात्रा",
        ],
    ),
    (
        Topic::Name,
        &[
            "name", "nombre", "nom", "nome", "имя", "名前", "名字", "اسم", "नाम",
        ],
    ),
];

/// Latin and Cyrillic keywords match whole words; other scripts have no
/// word separators and match as substrings.
fn keyword_pattern(keyword: &str) -> String {
    let escaped = regex::escape(keyword);
    let bounded = keyword
        .chars()
        .all(|c| c == ' ' || c < '\u{0250}' || ('\u{0400}'..='\u{04FF}').contains(&c));
    if bounded {
        format!(r"\b{escaped}\b")
    } else {
        escaped
    }
}

static TOPIC_PATTERNS: LazyLock<Vec<(Topic, Regex)>> = LazyLock::new(|| {
    KEYWORDS
        .iter()
        .map(|(topic, words)| {
            let alternatives: Vec<String> = words.iter().map(|w| keyword_pattern(w)).collect();
            let pattern = format!("(?i)(?:{})", alternatives.join("|"));
            (*topic, Regex::new(&pattern).unwrap())
        })
        .collect()
});

/// The first topic whose keywords appear in `text`.
pub fn classify(text: &str) -> Topic {
    TOPIC_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(topic, _)| *topic)
        .unwrap_or(Topic::Generic)
}

fn message(text: impl Into<String>, animation: Animation, language: LanguageTag) -> ReplyMessage {
    ReplyMessage::new(text, FacialExpression::Smile, animation, language).with_fallback(true)
}

/// Keyword-matched fallback reply in `language`. Always non-empty.
pub fn contextual_reply(user_text: &str, language: LanguageTag) -> Vec<ReplyMessage> {
    let table = table(language);
    let single = |text: &str| vec![message(text, Animation::TalkingOne, language)];
    match classify(user_text) {
        Topic::HowAreYou => single(table.how_are_you),
        Topic::Hello => single(table.hello),
        Topic::Weather => single(table.weather),
        Topic::Name => single(table.name),
        Topic::Travel => vec![
            message(table.travel[0], Animation::TalkingOne, language),
            message(table.travel[1], Animation::TalkingThree, language),
        ],
        Topic::Generic => {
            let echoed = user_text.trim();
            vec![
                message(
                    table.generic[0].replace("{text}", echoed),
                    Animation::TalkingOne,
                    language,
                ),
                message(table.generic[1], Animation::TalkingThree, language),
            ]
        }
    }
}

/// Whether `text` is a bare one-word greeting.
pub fn is_generic_greeting(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "hi" | "hello" | "hey"
    )
}

/// Self-introduction returned for bare greetings without consulting the model.
pub fn introduction(language: LanguageTag) -> Vec<ReplyMessage> {
    if language != LanguageTag::En {
        return vec![
            ReplyMessage::new(
                table(language).hello,
                FacialExpression::Smile,
                Animation::TalkingOne,
                language,
            ),
        ];
    }
    vec![
        ReplyMessage::new(
            "Hello! Nice to meet you. I'm Jack, your digital human assistant.",
            FacialExpression::Smile,
            Animation::TalkingOne,
            language,
        ),
        ReplyMessage::new(
            "I love to chat about travel, culture, or anything else on your mind. What would you like to talk about?",
            FacialExpression::Smile,
            Animation::TalkingThree,
            language,
        ),
    ]
}
